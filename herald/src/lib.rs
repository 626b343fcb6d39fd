//! Herald: outbound SMTP mail dispatch.
//!
//! Build a [`Message`], then hand it to a [`Mailer`] (one session per send),
//! a [`ConnectionPool`] (reused, authenticated sessions) or a [`SendQueue`]
//! (rate-limited, retrying workers in front of either). A [`Herald`] loads the
//! whole setup from a RON file and wires these together.
//!
//! ```no_run
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let herald = herald::Herald::from_file("herald.config.ron")?;
//! let mailer = herald.mailer()?;
//!
//! let mut message = herald::Message::new();
//! message
//!     .add_to("ops@example.com")
//!     .set_subject("Nightly report")
//!     .set_plain_body("All green.");
//!
//! mailer.send(&message).await?;
//! # Ok(())
//! # }
//! ```

mod config;

pub use config::{ConfigError, Herald};
pub use herald_common::{
    config::{
        AuthMechanism, Credentials, DkimConfig, PoolConfig, QueueConfig, SessionConfig, TlsConfig,
        TlsMode,
    },
    logging,
};
pub use herald_delivery::{
    BatchResult, ConnectionPool, DeliveryError, Mailer, PermanentError, PoolStats,
    PooledConnection, QueueError, Results, SendQueue, SendResult, SystemError, TemporaryError,
    Transport,
};
pub use herald_smtp::{
    Attachment, BuiltMessage, DkimError, DkimIdentity, Message, Priority, build, build_as,
    data_uri,
};
