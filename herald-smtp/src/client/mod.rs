//! SMTP submission client.
//!
//! - [`SmtpClient`] speaks the line protocol: commands out, replies in, DATA
//!   transparency, STARTTLS upgrade.
//! - [`SmtpSession`] drives a whole session on top of it: TLS policy,
//!   greeting, EHLO, SASL authentication and mail transactions.
//!
//! ```no_run
//! use herald_common::config::{Credentials, SessionConfig};
//! use herald_smtp::client::SmtpSession;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = SessionConfig::new("smtp.example.com", 587, "noreply@example.com")
//!     .with_credentials(Credentials::new("noreply", "secret"));
//!
//! let mut session = SmtpSession::dial(&config).await?;
//! if let Some(credentials) = &config.credentials {
//!     session.authenticate(credentials, config.auth).await?;
//! }
//! session
//!     .send(&config.from, &["user@example.org".to_string()], b"Subject: Hi\r\n\r\nHello")
//!     .await?;
//! session.quit().await?;
//! # Ok(())
//! # }
//! ```

pub mod auth;
mod connection;
pub mod error;
pub mod response;
pub mod session;
mod smtp_client;

pub use auth::Authenticator;
pub use error::{ClientError, Result};
pub use response::{Response, ResponseLine};
pub use session::SmtpSession;
pub use smtp_client::SmtpClient;
