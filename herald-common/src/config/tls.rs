//! TLS configuration for outbound SMTP connections.

use serde::{Deserialize, Serialize};

/// How the SMTP transport is secured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TlsMode {
    /// Plaintext for the whole session.
    ///
    /// **WARNING**: credentials and content travel unencrypted.
    None,

    /// Connect in plaintext, then upgrade with STARTTLS before any credentials
    /// are sent. Conventionally port 587.
    #[default]
    #[serde(alias = "start_tls", alias = "explicit")]
    Starttls,

    /// Open a TLS connection before the SMTP greeting. Conventionally port 465.
    Implicit,
}

impl TlsMode {
    /// Whether the connection ends up encrypted before authentication.
    #[must_use]
    pub const fn is_encrypted(self) -> bool {
        !matches!(self, Self::None)
    }
}

/// Complete TLS configuration for an SMTP connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TlsConfig {
    /// When and how TLS is negotiated.
    ///
    /// Default: `Starttls`
    #[serde(default)]
    pub mode: TlsMode,

    /// Whether to accept invalid TLS certificates (self-signed, expired, etc.).
    ///
    /// **SECURITY WARNING**: Setting this to `true` disables certificate validation
    /// and makes the connection vulnerable to man-in-the-middle attacks. Only set
    /// it for lab setups with self-signed certificates.
    ///
    /// Default: `false` (validate certificates)
    #[serde(default, alias = "skip_verify")]
    pub accept_invalid_certs: bool,
}

impl TlsConfig {
    #[must_use]
    pub const fn new(mode: TlsMode) -> Self {
        Self {
            mode,
            accept_invalid_certs: false,
        }
    }

    #[must_use]
    pub const fn accept_invalid_certs(mut self, accept: bool) -> Self {
        self.accept_invalid_certs = accept;
        self
    }
}
