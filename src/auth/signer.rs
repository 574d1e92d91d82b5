//! RSA-PSS request signer

use base64::prelude::*;
use ring::rand::SystemRandom;
use ring::signature::{RsaKeyPair, RSA_PSS_SHA256};
use std::fmt;
use std::sync::Arc;

use super::{
    SigningError, CONTENT_TYPE_JSON, HEADER_ACCESS_KEY, HEADER_ACCESS_SIGNATURE,
    HEADER_ACCESS_TIMESTAMP,
};

/// API key id plus the RSA private key used to sign requests
///
/// Loaded once and immutable for the life of the process. The `Debug`
/// representation never includes key material.
pub struct Credentials {
    key_id: String,
    key_pair: RsaKeyPair,
}

impl Credentials {
    /// Wrap an already parsed key pair
    pub fn new(key_id: impl Into<String>, key_pair: RsaKeyPair) -> Self {
        Self {
            key_id: key_id.into(),
            key_pair,
        }
    }

    /// Parse a PKCS#8 (`PRIVATE KEY`) or PKCS#1 (`RSA PRIVATE KEY`) PEM document
    ///
    /// # Errors
    /// Returns [`SigningError`] if the PEM is malformed, holds another kind of
    /// key, or the RSA key is rejected (for example smaller than 2048 bits).
    pub fn from_pem(key_id: impl Into<String>, pem_text: &str) -> Result<Self, SigningError> {
        let pem = pem::parse(pem_text.trim()).map_err(|e| SigningError::InvalidPem(e.to_string()))?;

        let key_pair = match pem.tag() {
            "PRIVATE KEY" => RsaKeyPair::from_pkcs8(pem.contents()),
            "RSA PRIVATE KEY" => RsaKeyPair::from_der(pem.contents()),
            other => return Err(SigningError::UnsupportedKey(other.to_string())),
        }
        .map_err(|e| SigningError::KeyRejected(e.to_string()))?;

        Ok(Self::new(key_id, key_pair))
    }

    /// API key identifier
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// DER-encoded `RSAPublicKey` matching the private key
    pub fn public_key_der(&self) -> &[u8] {
        use ring::signature::KeyPair;
        self.key_pair.public_key().as_ref()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("key_id", &self.key_id)
            .field("key_pair", &"<redacted>")
            .finish()
    }
}

/// Authentication headers for one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedHeaders {
    /// API key identifier
    pub key_id: String,
    /// Base64 RSA-PSS signature
    pub signature: String,
    /// Millisecond timestamp that was signed, as sent on the wire
    pub timestamp: String,
}

impl SignedHeaders {
    /// Header name/value pairs in wire order, content type first
    pub fn pairs(&self) -> [(&'static str, &str); 4] {
        [
            ("content-type", CONTENT_TYPE_JSON),
            (HEADER_ACCESS_KEY, self.key_id.as_str()),
            (HEADER_ACCESS_SIGNATURE, self.signature.as_str()),
            (HEADER_ACCESS_TIMESTAMP, self.timestamp.as_str()),
        ]
    }
}

/// Produces [`SignedHeaders`] for a method and path
///
/// Cheap to clone; clones share the same credentials.
#[derive(Clone)]
pub struct Signer {
    credentials: Arc<Credentials>,
    rng: SystemRandom,
}

impl Signer {
    /// Create a signer over shared credentials
    pub fn new(credentials: Arc<Credentials>) -> Self {
        Self {
            credentials,
            rng: SystemRandom::new(),
        }
    }

    /// Credentials this signer uses
    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Sign `method` + `path` with the current wall-clock time
    pub fn sign(&self, method: &str, path: &str) -> Result<SignedHeaders, SigningError> {
        self.sign_at(method, path, chrono::Utc::now().timestamp_millis())
    }

    /// Sign `method` + `path` with an explicit millisecond timestamp
    ///
    /// Any `?query` suffix on `path` is removed before signing.
    pub fn sign_at(
        &self,
        method: &str,
        path: &str,
        timestamp_ms: i64,
    ) -> Result<SignedHeaders, SigningError> {
        let timestamp = timestamp_ms.to_string();
        let message = signing_message(&timestamp, method, path);
        let signature = self.sign_text(&message)?;

        Ok(SignedHeaders {
            key_id: self.credentials.key_id.clone(),
            signature,
            timestamp,
        })
    }

    /// RSA-PSS (SHA-256, MGF1 SHA-256, digest-length salt) over UTF-8 text, base64 encoded
    pub fn sign_text(&self, text: &str) -> Result<String, SigningError> {
        let key_pair = &self.credentials.key_pair;
        let mut signature = vec![0u8; key_pair.public().modulus_len()];

        key_pair
            .sign(&RSA_PSS_SHA256, &self.rng, text.as_bytes(), &mut signature)
            .map_err(|_| SigningError::SignatureFailed)?;

        Ok(BASE64_STANDARD.encode(signature))
    }
}

impl fmt::Debug for Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signer")
            .field("key_id", &self.credentials.key_id)
            .finish_non_exhaustive()
    }
}

/// Path with any `?query` suffix removed
pub fn strip_query(path: &str) -> &str {
    path.split_once('?').map_or(path, |(base, _)| base)
}

/// Exact text that gets signed: `timestamp + METHOD + path-without-query`
pub fn signing_message(timestamp: &str, method: &str, path: &str) -> String {
    format!("{timestamp}{method}{}", strip_query(path))
}
