//! One-shot delivery: every send dials, authenticates, transmits and quits.

use std::sync::Arc;

use async_trait::async_trait;
use herald_common::{config::SessionConfig, internal};
use herald_smtp::{
    BuiltMessage, DkimIdentity, Message, build_as,
    client::{ClientError, SmtpSession},
};

use crate::{DeliveryError, Transport};

/// Outcome of one message in [`Mailer::send_batch`].
#[derive(Debug)]
pub struct BatchResult {
    /// First `To` address of the message, or empty if it had none.
    pub to: String,
    pub error: Option<DeliveryError>,
}

impl BatchResult {
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Sends messages through the server described by a [`SessionConfig`],
/// optionally DKIM-signing them first.
#[derive(Debug, Clone)]
pub struct Mailer {
    config: Arc<SessionConfig>,
    dkim: Option<Arc<DkimIdentity>>,
}

impl Mailer {
    #[must_use]
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config: Arc::new(config),
            dkim: None,
        }
    }

    /// Signs every outgoing message with `identity`.
    #[must_use]
    pub fn with_dkim(mut self, identity: DkimIdentity) -> Self {
        self.dkim = Some(Arc::new(identity));
        self
    }

    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    #[must_use]
    pub fn dkim(&self) -> Option<&DkimIdentity> {
        self.dkim.as_deref()
    }

    /// Renders `message` as it would be transmitted, signature included.
    ///
    /// # Errors
    ///
    /// Returns a system error if DKIM signing fails.
    pub fn prepare(&self, message: &Message) -> Result<BuiltMessage, DeliveryError> {
        let mut built = build_as(message, &self.config.from);
        if let Some(dkim) = &self.dkim {
            dkim.sign_message(&mut built)?;
        }
        Ok(built)
    }

    /// Builds, signs and sends `message` over a fresh session. The session is
    /// closed with QUIT whatever the outcome.
    ///
    /// # Errors
    ///
    /// Returns the first failure among signing, dialing, authentication and
    /// the mail transaction.
    pub async fn send(&self, message: &Message) -> Result<(), DeliveryError> {
        let built = self.prepare(message)?;
        let mut session = open_session(&self.config).await?;

        let result = session
            .send(built.sender(), built.recipients(), &built.to_bytes())
            .await;
        close(session).await;

        result.map_err(DeliveryError::from)
    }

    /// Checks that the server is reachable and accepts our credentials.
    ///
    /// # Errors
    ///
    /// Returns the dial or authentication failure.
    pub async fn verify(&self) -> Result<(), DeliveryError> {
        let session = open_session(&self.config).await?;
        session.quit().await?;
        Ok(())
    }

    /// Sends each message in turn over its own session, collecting one
    /// result per message in order.
    pub async fn send_batch(&self, messages: &[Message]) -> Vec<BatchResult> {
        let mut results = Vec::with_capacity(messages.len());
        for message in messages {
            let error = self.send(message).await.err();
            results.push(BatchResult {
                to: message.to.first().cloned().unwrap_or_default(),
                error,
            });
        }
        results
    }
}

#[async_trait]
impl Transport for Mailer {
    async fn send(&self, message: &Message) -> Result<(), DeliveryError> {
        Self::send(self, message).await
    }
}

/// Dials and, when credentials are configured, authenticates. A session that
/// fails authentication is closed before the error is returned.
pub(crate) async fn open_session(config: &SessionConfig) -> Result<SmtpSession, ClientError> {
    let mut session = SmtpSession::dial(config).await?;

    if let Some(credentials) = &config.credentials
        && let Err(err) = session.authenticate(credentials, config.auth).await
    {
        close(session).await;
        return Err(err);
    }

    Ok(session)
}

/// QUIT, logging rather than surfacing a failure: the outcome that matters
/// has already been decided.
pub(crate) async fn close(session: SmtpSession) {
    if let Err(err) = session.quit().await {
        internal!(level = DEBUG, "QUIT failed: {err}");
    }
}
