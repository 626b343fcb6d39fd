//! One SMTP session: dial, optional authentication, and any number of
//! envelope + DATA transactions over the same connection.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use herald_common::{
    config::{AuthMechanism, Credentials, SessionConfig, TlsMode},
    internal,
};

use super::{
    auth::authenticator,
    error::{ClientError, Result},
    response::Response,
    smtp_client::SmtpClient,
};

/// A live, greeted SMTP session.
pub struct SmtpSession {
    client: SmtpClient,
    capabilities: Response,
    localhost: bool,
}

impl SmtpSession {
    /// Connects according to `config.tls`, reads the greeting and introduces
    /// ourselves. With [`TlsMode::Starttls`] the connection is upgraded and
    /// EHLO repeated before this returns, so no credentials ever cross a
    /// plaintext link.
    ///
    /// # Errors
    ///
    /// Returns a network or TLS error if the connection cannot be set up, or
    /// a rejection if the server refuses the greeting, EHLO or STARTTLS.
    #[tracing::instrument(skip_all, fields(server = %config.address(), tls = ?config.tls.mode))]
    pub async fn dial(config: &SessionConfig) -> Result<Self> {
        let address = config.address();
        let accept_invalid_certs = config.tls.accept_invalid_certs;

        if accept_invalid_certs && config.tls.mode.is_encrypted() {
            tracing::warn!(
                server = %address,
                "Certificate verification is disabled; the server's identity is not checked"
            );
        }

        let mut client = match config.tls.mode {
            TlsMode::Implicit => {
                SmtpClient::connect_tls(&address, config.host.as_str(), accept_invalid_certs)
                    .await?
            }
            TlsMode::None | TlsMode::Starttls => SmtpClient::connect(&address, config.host.as_str())
                .await?
                .accept_invalid_certs(accept_invalid_certs),
        };

        let greeting = client.read_greeting().await?;
        if !greeting.is_success() {
            return Err(ClientError::GreetingRejected {
                code: greeting.code,
                message: greeting.message(),
            });
        }

        let mut capabilities = ehlo(&mut client, &config.helo_name).await?;

        if config.tls.mode == TlsMode::Starttls {
            let response = client.starttls().await?;
            if !response.is_success() {
                return Err(ClientError::CommandRejected {
                    command: "STARTTLS",
                    code: response.code,
                    message: response.message(),
                });
            }
            capabilities = ehlo(&mut client, &config.helo_name).await?;
        }

        internal!(
            level = DEBUG,
            encrypted = client.is_encrypted(),
            "Session established with {address}"
        );

        Ok(Self {
            client,
            capabilities,
            localhost: config.is_localhost(),
        })
    }

    /// The most recent EHLO reply.
    #[must_use]
    pub const fn capabilities(&self) -> &Response {
        &self.capabilities
    }

    #[must_use]
    pub fn is_encrypted(&self) -> bool {
        self.client.is_encrypted()
    }

    /// Runs the SASL exchange for `mechanism`.
    ///
    /// # Errors
    ///
    /// - [`ClientError::UnsupportedMechanism`] if EHLO did not advertise AUTH
    ///   or does not list `mechanism`.
    /// - [`ClientError::InsecureAuth`] for PLAIN over an unencrypted link to
    ///   anything but localhost.
    /// - [`ClientError::AuthRejected`] if the server refuses the credentials.
    /// - [`ClientError::AuthProtocol`] on an unexpected challenge.
    #[tracing::instrument(skip_all, fields(mechanism = %mechanism, user = %credentials.username))]
    pub async fn authenticate(
        &mut self,
        credentials: &Credentials,
        mechanism: AuthMechanism,
    ) -> Result<()> {
        let Some(offered) = self.capabilities.auth_mechanisms() else {
            return Err(ClientError::UnsupportedMechanism(
                "server does not advertise AUTH".to_string(),
            ));
        };
        if !offered.iter().any(|m| m == mechanism.as_str()) {
            return Err(ClientError::UnsupportedMechanism(format!(
                "{mechanism} (server offers {})",
                offered.join(" ")
            )));
        }
        if mechanism == AuthMechanism::Plain && !self.is_encrypted() && !self.localhost {
            return Err(ClientError::InsecureAuth(mechanism.as_str()));
        }

        let mut auth = authenticator(mechanism, credentials);
        let command = match auth.initial_response() {
            Some(initial) => format!("AUTH {mechanism} {initial}"),
            None => format!("AUTH {mechanism}"),
        };
        let mut response = self.client.secret_command(&command).await?;

        loop {
            if response.code == 235 {
                internal!(level = DEBUG, "Authenticated");
                return Ok(());
            }
            if response.code != 334 {
                return Err(ClientError::AuthRejected {
                    code: response.code,
                    message: response.message(),
                });
            }

            let challenge = STANDARD
                .decode(response.message().trim())
                .map_err(|e| ClientError::AuthProtocol(format!("undecodable challenge: {e}")))?;

            match auth.respond(&challenge) {
                Ok(answer) => response = self.client.secret_command(&answer).await?,
                Err(err) => {
                    // RFC 4954: "*" cancels the exchange.
                    self.client.command("*").await?;
                    return Err(err);
                }
            }
        }
    }

    /// Runs one mail transaction: MAIL FROM, one RCPT TO per recipient, DATA.
    /// Any refusal aborts the rest of the transaction.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NoRecipients`] for an empty recipient list, a
    /// `*Rejected` error when the server refuses a step, or a network error.
    #[tracing::instrument(skip_all, fields(from = %from, recipients = recipients.len()))]
    pub async fn send(&mut self, from: &str, recipients: &[String], message: &[u8]) -> Result<()> {
        if recipients.is_empty() {
            return Err(ClientError::NoRecipients);
        }

        let response = self.client.mail_from(from).await?;
        if !response.is_success() {
            return Err(ClientError::SenderRejected {
                sender: from.to_string(),
                code: response.code,
                message: response.message(),
            });
        }

        for recipient in recipients {
            let response = self.client.rcpt_to(recipient).await?;
            if !response.is_success() {
                return Err(ClientError::RecipientRejected {
                    recipient: recipient.clone(),
                    code: response.code,
                    message: response.message(),
                });
            }
        }

        let response = self.client.data().await?;
        if !response.is_intermediate() {
            return Err(ClientError::DataRejected {
                code: response.code,
                message: response.message(),
            });
        }

        let response = self.client.send_data(message).await?;
        if !response.is_success() {
            return Err(ClientError::DataRejected {
                code: response.code,
                message: response.message(),
            });
        }

        internal!(level = DEBUG, "Message accepted: {}", response.message());
        Ok(())
    }

    /// Abandons any partially declared transaction so the session can be
    /// reused.
    ///
    /// # Errors
    ///
    /// Returns an error if the server refuses RSET or the connection fails.
    pub async fn reset(&mut self) -> Result<()> {
        let response = self.client.rset().await?;
        if response.is_success() {
            Ok(())
        } else {
            Err(ClientError::CommandRejected {
                command: "RSET",
                code: response.code,
                message: response.message(),
            })
        }
    }

    /// Ends the session with QUIT.
    ///
    /// # Errors
    ///
    /// Returns an error if the server answers QUIT with an error or the
    /// connection fails.
    pub async fn quit(mut self) -> Result<()> {
        let response = self.client.quit().await?;
        if response.is_error() {
            return Err(ClientError::CommandRejected {
                command: "QUIT",
                code: response.code,
                message: response.message(),
            });
        }
        Ok(())
    }
}

async fn ehlo(client: &mut SmtpClient, helo_name: &str) -> Result<Response> {
    let response = client.ehlo(helo_name).await?;
    if response.is_success() {
        Ok(response)
    } else {
        Err(ClientError::CommandRejected {
            command: "EHLO",
            code: response.code,
            message: response.message(),
        })
    }
}
