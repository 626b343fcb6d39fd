//! SASL mechanisms for `AUTH`.
//!
//! Each mechanism is a small state machine: an optional initial response sent
//! alongside `AUTH <MECH>`, then one reply per `334` challenge. Challenges and
//! responses cross this boundary already base64-decoded/encoded.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use herald_common::config::{AuthMechanism, Credentials};
use hmac::{Hmac, Mac};
use md5::Md5;

use super::error::{ClientError, Result};

type HmacMd5 = Hmac<Md5>;

pub trait Authenticator: Send {
    fn mechanism(&self) -> AuthMechanism;

    /// Base64 payload to send with the `AUTH` command itself, if any.
    fn initial_response(&mut self) -> Option<String>;

    /// Answers a decoded server challenge with a base64 payload.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::AuthProtocol`] if the challenge is not one this
    /// mechanism expects at this point.
    fn respond(&mut self, challenge: &[u8]) -> Result<String>;
}

/// Returns the authenticator for `mechanism`, primed with `credentials`.
#[must_use]
pub fn authenticator(mechanism: AuthMechanism, credentials: &Credentials) -> Box<dyn Authenticator> {
    match mechanism {
        AuthMechanism::Plain => Box::new(Plain::new(credentials)),
        AuthMechanism::Login => Box::new(Login::new(credentials)),
        AuthMechanism::CramMd5 => Box::new(CramMd5::new(credentials)),
    }
}

/// RFC 4616 `PLAIN`: `\0user\0password` in a single initial response.
pub struct Plain {
    credentials: Credentials,
    sent: bool,
}

impl Plain {
    #[must_use]
    pub fn new(credentials: &Credentials) -> Self {
        Self {
            credentials: credentials.clone(),
            sent: false,
        }
    }
}

impl Authenticator for Plain {
    fn mechanism(&self) -> AuthMechanism {
        AuthMechanism::Plain
    }

    fn initial_response(&mut self) -> Option<String> {
        self.sent = true;
        let payload = format!(
            "\0{}\0{}",
            self.credentials.username, self.credentials.password
        );
        Some(STANDARD.encode(payload))
    }

    fn respond(&mut self, challenge: &[u8]) -> Result<String> {
        if self.sent {
            return Err(ClientError::AuthProtocol(format!(
                "PLAIN expects no further challenges, got {:?}",
                String::from_utf8_lossy(challenge)
            )));
        }
        self.initial_response()
            .ok_or_else(|| ClientError::AuthProtocol("PLAIN has no payload".to_string()))
    }
}

/// `LOGIN`: the server prompts for the username, then the password.
pub struct Login {
    credentials: Credentials,
}

impl Login {
    #[must_use]
    pub fn new(credentials: &Credentials) -> Self {
        Self {
            credentials: credentials.clone(),
        }
    }
}

impl Authenticator for Login {
    fn mechanism(&self) -> AuthMechanism {
        AuthMechanism::Login
    }

    fn initial_response(&mut self) -> Option<String> {
        None
    }

    fn respond(&mut self, challenge: &[u8]) -> Result<String> {
        match challenge {
            b"Username:" => Ok(STANDARD.encode(&self.credentials.username)),
            b"Password:" => Ok(STANDARD.encode(&self.credentials.password)),
            other => Err(ClientError::AuthProtocol(format!(
                "unexpected LOGIN prompt {:?}",
                String::from_utf8_lossy(other)
            ))),
        }
    }
}

/// RFC 2195 `CRAM-MD5`: `user hex(HMAC-MD5(password, challenge))`.
pub struct CramMd5 {
    credentials: Credentials,
}

impl CramMd5 {
    #[must_use]
    pub fn new(credentials: &Credentials) -> Self {
        Self {
            credentials: credentials.clone(),
        }
    }
}

impl Authenticator for CramMd5 {
    fn mechanism(&self) -> AuthMechanism {
        AuthMechanism::CramMd5
    }

    fn initial_response(&mut self) -> Option<String> {
        None
    }

    fn respond(&mut self, challenge: &[u8]) -> Result<String> {
        let mut mac = HmacMd5::new_from_slice(self.credentials.password.as_bytes())
            .map_err(|e| ClientError::AuthProtocol(e.to_string()))?;
        mac.update(challenge);
        let digest = hex::encode(mac.finalize().into_bytes());

        Ok(STANDARD.encode(format!("{} {digest}", self.credentials.username)))
    }
}
