//! DKIM signing identity.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Where to find the signing key and which headers to cover.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DkimConfig {
    /// Signing domain (`d=`).
    pub domain: String,

    /// Selector under `_domainkey.<domain>` publishing the public key (`s=`).
    pub selector: String,

    /// PEM file holding the RSA private key, PKCS#1 or PKCS#8.
    pub private_key: PathBuf,

    /// Header names to sign, in order (`h=`).
    #[serde(default = "default_headers")]
    pub headers: Vec<String>,
}

fn default_headers() -> Vec<String> {
    ["From", "To", "Subject"].map(String::from).to_vec()
}
