//! DKIM signing (RFC 6376), `rsa-sha256` with `simple/simple`
//! canonicalization only.

use std::{fmt, io, path::PathBuf};

use base64::{Engine as _, engine::general_purpose::STANDARD};
use herald_common::config::DkimConfig;
use ring::{
    digest::{SHA256, digest},
    rand::SystemRandom,
    signature::{KeyPair, RSA_PKCS1_SHA256, RsaKeyPair},
};
use thiserror::Error;
use tokio_rustls::rustls::pki_types::PrivateKeyDer;

use crate::message::{BuiltMessage, find_header};

#[derive(Error, Debug)]
pub enum DkimError {
    /// The private key could not be read or parsed.
    #[error("Invalid DKIM private key: {0}")]
    InvalidKey(String),

    #[error("Failed to read DKIM private key {path}: {source}")]
    KeyFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("DKIM signing failed: {0}")]
    Signing(String),
}

/// A parsed signing identity. Construction fails outright on a bad key, so
/// an identity that exists can always sign.
pub struct DkimIdentity {
    domain: String,
    selector: String,
    key: RsaKeyPair,
    headers: Vec<String>,
    rng: SystemRandom,
}

impl fmt::Debug for DkimIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DkimIdentity")
            .field("domain", &self.domain)
            .field("selector", &self.selector)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

impl DkimIdentity {
    /// Parses a PEM RSA private key (`RSA PRIVATE KEY` or `PRIVATE KEY`).
    ///
    /// # Errors
    ///
    /// Returns [`DkimError::InvalidKey`] if the PEM holds no RSA key ring
    /// accepts.
    pub fn new(
        domain: impl Into<String>,
        selector: impl Into<String>,
        private_key_pem: &[u8],
        headers: Vec<String>,
    ) -> Result<Self, DkimError> {
        let der = rustls_pemfile::private_key(&mut io::Cursor::new(private_key_pem))
            .map_err(|e| DkimError::InvalidKey(e.to_string()))?
            .ok_or_else(|| DkimError::InvalidKey("no private key found in PEM".to_string()))?;

        let key = match der {
            PrivateKeyDer::Pkcs1(key) => RsaKeyPair::from_der(key.secret_pkcs1_der()),
            PrivateKeyDer::Pkcs8(key) => RsaKeyPair::from_pkcs8(key.secret_pkcs8_der()),
            _ => {
                return Err(DkimError::InvalidKey(
                    "only RSA keys are supported".to_string(),
                ));
            }
        }
        .map_err(|e| DkimError::InvalidKey(e.to_string()))?;

        Ok(Self {
            domain: domain.into(),
            selector: selector.into(),
            key,
            headers,
            rng: SystemRandom::new(),
        })
    }

    /// Loads the key file named by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`DkimError::KeyFile`] if the file cannot be read, otherwise as
    /// [`Self::new`].
    pub fn from_config(config: &DkimConfig) -> Result<Self, DkimError> {
        let pem = std::fs::read(&config.private_key).map_err(|source| DkimError::KeyFile {
            path: config.private_key.clone(),
            source,
        })?;
        Self::new(
            config.domain.clone(),
            config.selector.clone(),
            &pem,
            config.headers.clone(),
        )
    }

    #[must_use]
    pub fn domain(&self) -> &str {
        &self.domain
    }

    #[must_use]
    pub fn selector(&self) -> &str {
        &self.selector
    }

    #[must_use]
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// DER `RSAPublicKey`, as published (base64) in the selector's `p=` tag.
    #[must_use]
    pub fn public_key(&self) -> &[u8] {
        self.key.public_key().as_ref()
    }

    /// Computes the `DKIM-Signature` header value for `headers` and `body`.
    ///
    /// # Errors
    ///
    /// Returns [`DkimError::Signing`] if the RSA operation fails.
    pub fn sign(&self, headers: &[(String, String)], body: &str) -> Result<String, DkimError> {
        let tags = format!(
            "v=1; a=rsa-sha256; c=simple/simple; d={}; s={}; h={}; bh={}; b=",
            self.domain,
            self.selector,
            self.headers.join(":"),
            body_hash(body)
        );
        let input = self.signing_input(headers, &tags);

        let mut signature = vec![0; self.key.public().modulus_len()];
        self.key
            .sign(&RSA_PKCS1_SHA256, &self.rng, input.as_bytes(), &mut signature)
            .map_err(|e| DkimError::Signing(e.to_string()))?;

        Ok(tags + &STANDARD.encode(signature))
    }

    /// Signs `message` and prepends the resulting `DKIM-Signature` header.
    ///
    /// # Errors
    ///
    /// As [`Self::sign`].
    pub fn sign_message(&self, message: &mut BuiltMessage) -> Result<(), DkimError> {
        let value = self.sign(message.headers(), message.body())?;
        message.prepend_header("DKIM-Signature", value);
        Ok(())
    }

    /// The covered headers as `name:value`, then the unsigned signature
    /// header itself, CRLF-separated.
    fn signing_input(&self, headers: &[(String, String)], tags: &str) -> String {
        let mut lines: Vec<String> = self
            .headers
            .iter()
            .filter_map(|name| {
                find_header(headers, name)
                    .map(|value| format!("{}:{}", name.to_ascii_lowercase(), value.trim()))
            })
            .collect();
        lines.push(format!("dkim-signature:{tags}"));
        lines.join("\r\n")
    }
}

/// Base64 SHA-256 of the body under `simple` canonicalization: trailing line
/// breaks collapse to exactly one CRLF.
#[must_use]
pub fn body_hash(body: &str) -> String {
    let canonical = format!("{}\r\n", body.trim_end_matches(['\r', '\n']));
    STANDARD.encode(digest(&SHA256, canonical.as_bytes()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use ring::signature::{RSA_PKCS1_2048_8192_SHA256, UnparsedPublicKey};

    use super::*;

    const PKCS1: &[u8] = include_bytes!("../tests/fixtures/rsa2048.pem");
    const PKCS8: &[u8] = include_bytes!("../tests/fixtures/rsa2048-pkcs8.pem");

    fn identity() -> DkimIdentity {
        DkimIdentity::new(
            "example.com",
            "mail",
            PKCS1,
            vec!["From".into(), "To".into(), "Subject".into()],
        )
        .unwrap()
    }

    fn headers() -> Vec<(String, String)> {
        [
            ("From", "sender@example.com"),
            ("To", "rcpt@example.org"),
            ("Subject", "  Hello  "),
            ("X-Other", "ignored"),
        ]
        .map(|(n, v)| (n.to_string(), v.to_string()))
        .to_vec()
    }

    fn tag<'a>(value: &'a str, name: &str) -> &'a str {
        value
            .split("; ")
            .find_map(|t| t.strip_prefix(&format!("{name}=")))
            .unwrap()
    }

    #[test]
    fn body_hash_ignores_trailing_line_breaks() {
        assert_eq!(body_hash("Hello\r\n"), body_hash("Hello\r\n\r\n\r\n"));
        assert_eq!(body_hash("Hello"), body_hash("Hello\r\n"));
        assert_ne!(body_hash("Hello"), body_hash("Hello!"));
        // RFC 6376 3.4.3: an empty body canonicalizes to a single CRLF.
        assert_eq!(body_hash(""), "frcCV1k9oG9oKj3dpUqdJg1PxRT2RSN/XKdLCPjaYaY=");
    }

    #[test]
    fn header_value_layout() {
        let value = identity().sign(&headers(), "Hello\r\n").unwrap();

        assert!(value.starts_with(
            "v=1; a=rsa-sha256; c=simple/simple; d=example.com; s=mail; h=From:To:Subject; bh="
        ));
        assert_eq!(tag(&value, "bh"), body_hash("Hello"));
        assert!(!tag(&value, "b").is_empty());
    }

    #[test]
    fn body_hash_is_deterministic() {
        let identity = identity();
        let first = identity.sign(&headers(), "Same body\r\n").unwrap();
        let second = identity.sign(&headers(), "Same body\r\n").unwrap();
        assert_eq!(tag(&first, "bh"), tag(&second, "bh"));
    }

    #[test]
    fn signing_input_lowercases_trims_and_skips_missing() {
        let identity = DkimIdentity::new(
            "example.com",
            "mail",
            PKCS1,
            vec!["Subject".into(), "Date".into(), "From".into()],
        )
        .unwrap();

        assert_eq!(
            identity.signing_input(&headers(), "v=1; b="),
            "subject:Hello\r\nfrom:sender@example.com\r\ndkim-signature:v=1; b="
        );
    }

    #[test]
    fn signature_verifies_with_public_key() {
        let identity = identity();
        let value = identity.sign(&headers(), "Hello\r\n").unwrap();
        let (unsigned, signature) = value.split_at(value.len() - tag(&value, "b").len());

        let input = identity.signing_input(&headers(), unsigned);
        let signature = STANDARD.decode(signature).unwrap();
        UnparsedPublicKey::new(&RSA_PKCS1_2048_8192_SHA256, identity.public_key())
            .verify(input.as_bytes(), &signature)
            .unwrap();
    }

    #[test]
    fn pkcs8_keys_are_accepted() {
        let pkcs8 = DkimIdentity::new("example.com", "mail", PKCS8, vec![]).unwrap();
        assert_eq!(pkcs8.public_key(), identity().public_key());
    }

    #[test]
    fn garbage_key_fails_at_construction() {
        let err = DkimIdentity::new("example.com", "mail", b"not a key", vec![]).unwrap_err();
        assert!(matches!(err, DkimError::InvalidKey(_)));

        let truncated = &PKCS1[..PKCS1.len() / 2];
        assert!(DkimIdentity::new("example.com", "mail", truncated, vec![]).is_err());
    }

    #[test]
    fn sign_message_prepends_header() {
        let mut message = crate::message::Message::new();
        message.add_to("rcpt@example.org").set_subject("Hi").set_plain_body("Body");
        let mut built = crate::message::build_as(&message, "sender@example.com");

        identity().sign_message(&mut built).unwrap();

        let (name, value) = &built.headers()[0];
        assert_eq!(name, "DKIM-Signature");
        assert_eq!(tag(value, "bh"), body_hash(built.body()));
    }

    #[test]
    fn body_hash_covers_crlf_line_breaks_of_text_parts() {
        let mut message = crate::message::Message::new();
        message
            .add_to("rcpt@example.org")
            .set_subject("Hi")
            .set_plain_body("line one\nline two");
        let mut built = crate::message::build_as(&message, "sender@example.com");

        identity().sign_message(&mut built).unwrap();

        let body = built.body();
        assert!(body.contains("line one\r\nline two\r\n"));
        assert!(!body.replace("\r\n", "").contains('\n'));
        assert_eq!(tag(&built.headers()[0].1, "bh"), body_hash(body));
    }

    #[test]
    fn missing_key_file_is_reported() {
        let config = DkimConfig {
            domain: "example.com".into(),
            selector: "mail".into(),
            private_key: "/nonexistent/herald/dkim.pem".into(),
            headers: vec![],
        };
        assert!(matches!(
            DkimIdentity::from_config(&config),
            Err(DkimError::KeyFile { .. })
        ));
    }
}
