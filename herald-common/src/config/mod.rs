//! Configuration types shared by the herald crates.
//!
//! - [`tls`]: how the transport is secured and whether certificates are verified
//! - [`auth`]: SASL mechanism selection and credentials
//! - [`session`]: everything needed to open one SMTP session
//! - [`pool`], [`queue`]: connection reuse and asynchronous delivery
//! - [`dkim`]: the signing identity

pub mod auth;
pub mod dkim;
pub mod pool;
pub mod queue;
pub mod session;
pub mod tls;

pub use auth::{AuthMechanism, Credentials};
pub use dkim::DkimConfig;
pub use pool::PoolConfig;
pub use queue::QueueConfig;
pub use session::SessionConfig;
pub use tls::{TlsConfig, TlsMode};
