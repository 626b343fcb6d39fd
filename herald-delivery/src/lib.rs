//! Delivery front ends over the herald SMTP client.
//!
//! - [`Mailer`]: one session per message
//! - [`ConnectionPool`]: a bounded set of reusable sessions
//! - [`SendQueue`]: asynchronous, rate-limited, retrying delivery through any
//!   [`Transport`]

mod error;
mod mailer;
mod pool;
pub mod queue;
mod rate_limiter;
mod transport;

pub use error::{DeliveryError, PermanentError, SystemError, TemporaryError};
pub use mailer::{BatchResult, Mailer};
pub use pool::{ConnectionPool, PoolStats, PooledConnection};
pub use queue::{QueueError, Results, RetryPolicy, SendQueue, SendResult};
pub use rate_limiter::RateLimiter;
pub use transport::Transport;
