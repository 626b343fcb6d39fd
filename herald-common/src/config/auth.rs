//! Authentication settings.

use std::fmt;

use serde::{Deserialize, Serialize};

/// SASL mechanism used to authenticate against the submission server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum AuthMechanism {
    #[default]
    #[serde(rename = "plain", alias = "PLAIN")]
    Plain,
    #[serde(rename = "login", alias = "LOGIN")]
    Login,
    #[serde(rename = "cram-md5", alias = "CRAM-MD5", alias = "cram_md5")]
    CramMd5,
}

impl AuthMechanism {
    /// The mechanism name as it appears in `AUTH` commands and EHLO keywords.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Plain => "PLAIN",
            Self::Login => "LOGIN",
            Self::CramMd5 => "CRAM-MD5",
        }
    }
}

impl fmt::Display for AuthMechanism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Username and secret presented during `AUTH`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}
