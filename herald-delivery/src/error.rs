//! Typed error handling for delivery operations.
//!
//! Failures are categorized so callers can decide what to do with them:
//! - Permanent failures (5xx SMTP codes, refused credentials) won't succeed
//!   on retry
//! - Temporary failures (4xx SMTP codes, network trouble) may
//! - System errors are configuration or internal problems

use herald_smtp::{DkimError, client::ClientError};
use thiserror::Error;

/// Top-level delivery error type.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// Permanent failure that should not be retried (e.g., 5xx SMTP codes).
    #[error("Permanent failure: {0}")]
    Permanent(#[from] PermanentError),

    /// Temporary failure that may succeed later (e.g., 4xx SMTP codes).
    #[error("Temporary failure: {0}")]
    Temporary(#[from] TemporaryError),

    /// System-level error (configuration, signing, internal errors).
    #[error("System error: {0}")]
    System(#[from] SystemError),

    /// The queue shut down before the message was attempted.
    #[error("Delivery cancelled: queue stopped before the message was sent")]
    Cancelled,
}

/// Permanent errors that should not be retried.
#[derive(Debug, Error)]
pub enum PermanentError {
    /// The server refused the envelope sender.
    #[error("Sender rejected: {0}")]
    SenderRejected(String),

    /// A recipient address was refused; the whole send is aborted.
    #[error("Invalid recipient: {0}")]
    InvalidRecipient(String),

    /// The message content was refused.
    #[error("Message rejected: {0}")]
    MessageRejected(String),

    /// The server refused the session (greeting, EHLO, STARTTLS).
    #[error("Session rejected: {0}")]
    SessionRejected(String),

    /// SMTP authentication failed.
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The message names nobody to deliver to.
    #[error("Message has no recipients")]
    NoRecipients,
}

/// Temporary errors that may succeed on another attempt.
#[derive(Debug, Error)]
pub enum TemporaryError {
    /// Failed to establish or keep the connection to the server.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// TLS handshake failed.
    #[error("TLS handshake failed: {0}")]
    TlsHandshakeFailed(String),

    /// Server returned a temporary failure code.
    #[error("Temporary SMTP error: {0}")]
    SmtpTemporary(String),

    /// No pooled connection became free in time.
    #[error("Timed out after {0:?} waiting for a pooled connection")]
    PoolTimeout(std::time::Duration),
}

/// System-level errors that indicate configuration or internal problems.
#[derive(Debug, Error)]
pub enum SystemError {
    /// Invalid configuration, including an unusable signing key or an auth
    /// mechanism the server cannot honour.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// DKIM signing failed.
    #[error("Signing error: {0}")]
    Signing(String),

    /// The pool was closed.
    #[error("Connection pool is closed")]
    PoolClosed,

    /// Other internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DeliveryError {
    /// Returns `true` if this error is temporary and should be retried.
    #[must_use]
    pub const fn is_temporary(&self) -> bool {
        matches!(self, Self::Temporary(_))
    }

    /// Returns `true` if this error is permanent and should not be retried.
    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        matches!(self, Self::Permanent(_))
    }

    /// Returns `true` if this is a system error.
    #[must_use]
    pub const fn is_system(&self) -> bool {
        matches!(self, Self::System(_))
    }

    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Categorizes a server reply: 4xx is temporary, 5xx takes the given
/// permanent kind, anything else is unexpected.
fn reply(code: u16, message: &str, permanent: fn(String) -> PermanentError) -> DeliveryError {
    let text = format!("{code} {message}");
    match code {
        400..=499 => DeliveryError::Temporary(TemporaryError::SmtpTemporary(text)),
        500..=599 => DeliveryError::Permanent(permanent(text)),
        _ => DeliveryError::System(SystemError::Internal(format!(
            "Unexpected SMTP response: {text}"
        ))),
    }
}

/// Convert from SMTP `ClientError` to `DeliveryError`.
///
/// - **4xx SMTP codes** → Temporary
/// - **5xx SMTP codes** → Permanent
/// - **Connection/I/O and TLS errors** → Temporary
/// - **Parse errors, unusable auth configuration** → System
impl From<ClientError> for DeliveryError {
    fn from(error: ClientError) -> Self {
        match error {
            ClientError::GreetingRejected { code, message } => {
                reply(code, &message, PermanentError::SessionRejected)
            }
            ClientError::CommandRejected {
                command,
                code,
                message,
            } => reply(code, &format!("({command}) {message}"), PermanentError::SessionRejected),
            ClientError::AuthRejected { code, message } => {
                reply(code, &message, PermanentError::AuthenticationFailed)
            }
            ClientError::SenderRejected {
                sender,
                code,
                message,
            } => reply(code, &format!("<{sender}> {message}"), PermanentError::SenderRejected),
            ClientError::RecipientRejected {
                recipient,
                code,
                message,
            } => reply(
                code,
                &format!("<{recipient}> {message}"),
                PermanentError::InvalidRecipient,
            ),
            ClientError::DataRejected { code, message } => {
                reply(code, &message, PermanentError::MessageRejected)
            }

            ClientError::Io(e) => {
                Self::Temporary(TemporaryError::ConnectionFailed(format!("I/O error: {e}")))
            }
            ClientError::ConnectionClosed => Self::Temporary(TemporaryError::ConnectionFailed(
                "Connection closed unexpectedly".to_string(),
            )),
            ClientError::Tls(msg) => Self::Temporary(TemporaryError::TlsHandshakeFailed(msg)),

            ClientError::AuthProtocol(msg) => {
                Self::Permanent(PermanentError::AuthenticationFailed(msg))
            }
            ClientError::NoRecipients => Self::Permanent(PermanentError::NoRecipients),

            error @ (ClientError::UnsupportedMechanism(_) | ClientError::InsecureAuth(_)) => {
                Self::System(SystemError::Configuration(error.to_string()))
            }

            ClientError::ParseError(msg) => Self::System(SystemError::Internal(format!(
                "SMTP protocol parse error: {msg}"
            ))),
            ClientError::Utf8Error(e) => {
                Self::System(SystemError::Internal(format!("UTF-8 decoding error: {e}")))
            }
        }
    }
}

impl From<DkimError> for DeliveryError {
    fn from(error: DkimError) -> Self {
        match error {
            DkimError::Signing(msg) => Self::System(SystemError::Signing(msg)),
            error @ (DkimError::InvalidKey(_) | DkimError::KeyFile { .. }) => {
                Self::System(SystemError::Configuration(error.to_string()))
            }
        }
    }
}
