//! REST transport, pagination and batch fetching

use crate::auth::SigningError;

pub mod batch;
pub mod environment;
pub mod kalshi_http;
pub mod pagination;
pub mod query;
pub mod retry_formatter;

pub use batch::{BatchFetcher, BatchItem, BatchItemError};
pub use environment::Environment;
pub use kalshi_http::{ClientConfig, KalshiHttpClient, RequestDescriptor, RetryPolicy};
pub use pagination::Page;
pub use query::{EventsFilter, MarketsFilter, QueryParams, TradesFilter};

/// How a failed call should be treated by callers that aggregate failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Retrying will not help (bad key, 4xx, undecodable body)
    Fatal,
    /// Transient: network trouble, 429 or 5xx
    Retryable,
    /// Retryable failure that already used up its attempts
    Exhausted,
}

/// Fetcher errors
#[derive(Debug, thiserror::Error)]
pub enum FetcherError {
    /// Request could not be signed
    #[error("signing failed: {0}")]
    Signing(#[from] SigningError),

    /// Connection, TLS, timeout or body read failure
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Non-2xx response; body read in full
    #[error("HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    /// 2xx response whose body is not the expected JSON
    #[error("parse error: {0}")]
    Parse(String),

    /// Request could not be built (bad base URL, empty ticker, ...)
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Retry budget used up; carries the last failure
    #[error("request failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        last: Box<FetcherError>,
    },
}

impl FetcherError {
    /// Classify this failure
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Network(_) => FailureKind::Retryable,
            Self::HttpStatus { status, .. } if *status == 429 || *status >= 500 => {
                FailureKind::Retryable
            }
            Self::RetriesExhausted { .. } => FailureKind::Exhausted,
            _ => FailureKind::Fatal,
        }
    }

    /// Check if another attempt could succeed
    pub fn is_retryable(&self) -> bool {
        self.kind() == FailureKind::Retryable
    }

    /// HTTP status behind this failure, looking through exhausted retries
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            Self::Network(e) => e.status().map(|s| s.as_u16()),
            Self::RetriesExhausted { last, .. } => last.status(),
            _ => None,
        }
    }
}

/// Result type for fetcher operations
pub type FetcherResult<T> = Result<T, FetcherError>;
