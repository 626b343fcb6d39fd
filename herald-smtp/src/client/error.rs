//! Error types for the SMTP client.

use std::io;

use thiserror::Error;

/// Errors that can occur while driving an SMTP session.
#[derive(Error, Debug)]
pub enum ClientError {
    /// IO error occurred during network operations.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Connection was closed unexpectedly.
    #[error("Connection closed unexpectedly")]
    ConnectionClosed,

    /// TLS handshake or configuration failure.
    #[error("TLS error: {0}")]
    Tls(String),

    /// Failed to parse an SMTP response from the server.
    #[error("Failed to parse SMTP response: {0}")]
    ParseError(String),

    /// UTF-8 decoding error.
    #[error("UTF-8 error: {0}")]
    Utf8Error(#[from] std::str::Utf8Error),

    /// The server did not greet us with a 2xx reply.
    #[error("Server rejected connection: {code} {message}")]
    GreetingRejected { code: u16, message: String },

    /// EHLO, STARTTLS or another session-level command was refused.
    #[error("Server rejected {command}: {code} {message}")]
    CommandRejected {
        command: &'static str,
        code: u16,
        message: String,
    },

    /// The server does not offer the configured SASL mechanism.
    #[error("Unsupported authentication mechanism: {0}")]
    UnsupportedMechanism(String),

    /// Credentials would be sent in clear over an unencrypted connection.
    #[error("Refusing to send {0} credentials over an unencrypted connection")]
    InsecureAuth(&'static str),

    /// The server refused the credentials.
    #[error("Authentication rejected: {code} {message}")]
    AuthRejected { code: u16, message: String },

    /// The server sent a challenge the mechanism does not understand.
    #[error("Unexpected authentication challenge: {0}")]
    AuthProtocol(String),

    /// `MAIL FROM` was refused.
    #[error("Server rejected MAIL FROM <{sender}>: {code} {message}")]
    SenderRejected {
        sender: String,
        code: u16,
        message: String,
    },

    /// A single `RCPT TO` was refused, which aborts the whole transaction.
    #[error("Server rejected RCPT TO <{recipient}>: {code} {message}")]
    RecipientRejected {
        recipient: String,
        code: u16,
        message: String,
    },

    /// `DATA` or the message content was refused.
    #[error("Server rejected message data: {code} {message}")]
    DataRejected { code: u16, message: String },

    /// The message has no envelope recipients.
    #[error("Message has no recipients")]
    NoRecipients,
}

impl ClientError {
    /// The SMTP reply code attached to this error, if the server produced one.
    #[must_use]
    pub const fn code(&self) -> Option<u16> {
        match self {
            Self::GreetingRejected { code, .. }
            | Self::CommandRejected { code, .. }
            | Self::AuthRejected { code, .. }
            | Self::SenderRejected { code, .. }
            | Self::RecipientRejected { code, .. }
            | Self::DataRejected { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Whether the failure happened at the transport rather than protocol level.
    ///
    /// A session that produced a transport failure can not be reused.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Io(_) | Self::ConnectionClosed | Self::Tls(_) | Self::ParseError(_) | Self::Utf8Error(_)
        )
    }
}

/// Specialized `Result` type for SMTP client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
