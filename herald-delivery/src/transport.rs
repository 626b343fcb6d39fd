use async_trait::async_trait;
use herald_smtp::Message;

use crate::DeliveryError;

/// Anything that can deliver a single message: a [`crate::Mailer`] opening a
/// session per send, a [`crate::ConnectionPool`] reusing sessions, or a test
/// double.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Delivers `message`, returning once the server has accepted it.
    ///
    /// # Errors
    ///
    /// Returns the categorized reason the message was not accepted.
    async fn send(&self, message: &Message) -> Result<(), DeliveryError>;
}
