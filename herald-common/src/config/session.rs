//! Settings for a single outbound SMTP session.

use serde::{Deserialize, Serialize};

use super::{AuthMechanism, Credentials, TlsConfig};

/// Everything needed to dial, greet and authenticate against one server.
///
/// A `SessionConfig` is immutable for the lifetime of any pool or queue that
/// was built from it and is shared read-only between workers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Credentials for `AUTH`. When absent no authentication is attempted.
    #[serde(default)]
    pub credentials: Option<Credentials>,

    /// Default envelope sender and `From` header.
    pub from: String,

    /// Name announced in `EHLO`.
    #[serde(default = "default_helo_name")]
    pub helo_name: String,

    #[serde(default)]
    pub tls: TlsConfig,

    #[serde(default)]
    pub auth: AuthMechanism,
}

const fn default_port() -> u16 {
    587
}

fn default_helo_name() -> String {
    "localhost".to_string()
}

impl SessionConfig {
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16, from: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            credentials: None,
            from: from.into(),
            helo_name: default_helo_name(),
            tls: TlsConfig::default(),
            auth: AuthMechanism::default(),
        }
    }

    #[must_use]
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    #[must_use]
    pub const fn with_tls(mut self, tls: TlsConfig) -> Self {
        self.tls = tls;
        self
    }

    #[must_use]
    pub const fn with_auth(mut self, auth: AuthMechanism) -> Self {
        self.auth = auth;
        self
    }

    #[must_use]
    pub fn with_helo_name(mut self, helo_name: impl Into<String>) -> Self {
        self.helo_name = helo_name.into();
        self
    }

    /// `host:port`, suitable for `TcpStream::connect`.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Whether the configured host refers to the local machine.
    #[must_use]
    pub fn is_localhost(&self) -> bool {
        matches!(
            self.host.as_str(),
            "localhost" | "127.0.0.1" | "::1" | "[::1]"
        )
    }
}
