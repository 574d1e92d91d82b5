//! Request authentication
//!
//! Every REST call and the WebSocket upgrade request carry the same header set:
//! the API key id, a millisecond timestamp, and a base64 RSA-PSS (SHA-256)
//! signature over `timestamp + METHOD + path`. The path is signed without its
//! query string.
//!
//! Credentials are supplied by the caller as a key id plus PEM text; this
//! module never reads files or environment variables.

pub mod signer;

pub use signer::{signing_message, strip_query, Credentials, SignedHeaders, Signer};

/// Header carrying the API key identifier
pub const HEADER_ACCESS_KEY: &str = "kalshi-access-key";

/// Header carrying the base64 RSA-PSS signature
pub const HEADER_ACCESS_SIGNATURE: &str = "kalshi-access-signature";

/// Header carrying the millisecond timestamp that was signed
pub const HEADER_ACCESS_TIMESTAMP: &str = "kalshi-access-timestamp";

/// Content type sent with every authenticated request
pub const CONTENT_TYPE_JSON: &str = "application/json";

/// Signing errors
///
/// A signing failure means the key is corrupt or incompatible. It is fatal
/// for the call and is never retried.
#[derive(Debug, thiserror::Error)]
pub enum SigningError {
    /// PEM text could not be parsed
    #[error("invalid PEM: {0}")]
    InvalidPem(String),

    /// PEM block does not hold a supported private key
    #[error("unsupported PEM block '{0}', expected PRIVATE KEY or RSA PRIVATE KEY")]
    UnsupportedKey(String),

    /// Key material rejected by the crypto backend (malformed, too small, ...)
    #[error("private key rejected: {0}")]
    KeyRejected(String),

    /// The RSA-PSS signing operation failed
    #[error("RSA-PSS signing failed")]
    SignatureFailed,
}
