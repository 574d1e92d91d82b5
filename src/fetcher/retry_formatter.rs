//! Retry log message formatting
//!
//! Classifies transport failures for operators and renders the retry,
//! recovery and final-failure lines logged by the retrying request path.

use std::time::Duration;

use crate::fetcher::FetcherError;

/// Classification of retry errors for user messaging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryErrorType {
    /// Request or connect timed out
    NetworkTimeout,
    /// Connection refused, DNS failure, or other offline scenarios
    NetworkOffline,
    /// HTTP 429 rate limit exceeded
    RateLimit,
    /// HTTP 5xx server error
    ServerError(u16),
    /// HTTP 400 invalid request
    InvalidRequest,
    /// Authentication failures (401/403)
    AuthFailed(u16),
    /// Other client errors (4xx, except 429)
    ClientError(u16),
    /// Key could not produce a signature
    Signing,
    /// Response body was not the expected JSON
    MalformedResponse,
    /// Generic fallback when no better classification fits
    NetworkGeneric,
}

impl RetryErrorType {
    /// Classify a transport failure
    pub fn from_error(err: &FetcherError) -> Self {
        match err {
            FetcherError::HttpStatus { status, .. } => Self::from_status(*status),
            FetcherError::Network(e) => {
                if let Some(status) = e.status() {
                    Self::from_status(status.as_u16())
                } else if e.is_timeout() {
                    Self::NetworkTimeout
                } else if e.is_connect() {
                    Self::NetworkOffline
                } else {
                    Self::NetworkGeneric
                }
            }
            FetcherError::Signing(_) => Self::Signing,
            FetcherError::Parse(_) => Self::MalformedResponse,
            FetcherError::InvalidRequest(_) => Self::InvalidRequest,
            FetcherError::RetriesExhausted { last, .. } => Self::from_error(last),
        }
    }

    /// Classify an HTTP status code
    pub fn from_status(status: u16) -> Self {
        match status {
            400 => Self::InvalidRequest,
            401 | 403 => Self::AuthFailed(status),
            429 => Self::RateLimit,
            500..=599 => Self::ServerError(status),
            _ => Self::ClientError(status),
        }
    }

    /// User-friendly description string used inside retry log messages.
    pub fn description(&self) -> &'static str {
        match self {
            Self::NetworkTimeout => "network timeout",
            Self::NetworkOffline => "connection failed",
            Self::RateLimit => "rate limit exceeded",
            Self::ServerError(code) => match code {
                500 => "internal server error",
                502 => "bad gateway",
                503 => "service unavailable",
                504 => "gateway timeout",
                _ => "server error",
            },
            Self::InvalidRequest => "invalid request",
            Self::AuthFailed(401) => "authentication failed (401)",
            Self::AuthFailed(403) => "authentication failed (403)",
            Self::AuthFailed(_) => "authentication failed",
            Self::ClientError(404) => "resource not found",
            Self::ClientError(_) => "client error",
            Self::Signing => "request signing failed",
            Self::MalformedResponse => "malformed response",
            Self::NetworkGeneric => "network error",
        }
    }

    /// Suggested remediation presented after final failures.
    pub fn suggestion(&self) -> &'static str {
        match self {
            Self::NetworkTimeout => "Check your network connection and firewall settings",
            Self::NetworkOffline => "Verify internet connectivity and DNS resolution",
            Self::RateLimit => "Lower --rate-limit or switch to --even-spacing",
            Self::ServerError(_) => "Exchange may be experiencing issues, try again later",
            Self::InvalidRequest => "Check the path and query parameters for typos",
            Self::AuthFailed(_) => {
                "Verify the key id matches the private key and the environment (demo vs prod)"
            }
            Self::ClientError(_) => "Review request parameters against the API reference",
            Self::Signing => "Check that the key file holds an unencrypted RSA private key",
            Self::MalformedResponse => "Confirm the base URL points at the trade API",
            Self::NetworkGeneric => "Check network connectivity and try again",
        }
    }

    /// Determine whether the error type is typically retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NetworkTimeout
                | Self::NetworkOffline
                | Self::RateLimit
                | Self::ServerError(_)
                | Self::NetworkGeneric
        )
    }
}

/// Context for formatting retry messages.
#[derive(Debug, Clone)]
pub struct RetryContext {
    /// Attempt that just finished (1-based); a retry message announces `attempt + 1`
    pub attempt: u32,
    /// Maximum number of attempts configured
    pub max_attempts: u32,
    /// Type of error that triggered retry
    pub error_type: RetryErrorType,
    /// Backoff duration until next attempt
    pub backoff_duration: Duration,
    /// Request method and path, e.g. `GET /trade-api/v2/markets`
    pub endpoint: String,
    /// Original error message for details
    pub error_message: String,
}

impl RetryContext {
    pub fn new(
        attempt: u32,
        max_attempts: u32,
        error: &FetcherError,
        backoff_duration: Duration,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            attempt,
            max_attempts,
            error_type: RetryErrorType::from_error(error),
            backoff_duration,
            endpoint: endpoint.into(),
            error_message: error.to_string(),
        }
    }

    /// Format standardized retry message with attempt counters and context.
    pub fn format_retry(&self) -> String {
        format!(
            "Retrying (attempt {}/{}) after {} - waiting {:.1} seconds... ({})",
            self.attempt + 1,
            self.max_attempts,
            self.error_type.description(),
            self.backoff_duration.as_secs_f64(),
            self.endpoint
        )
    }

    /// Format retry success message when a previous attempt eventually works.
    pub fn format_success(&self) -> String {
        format!(
            "Retry attempt {}/{} succeeded ({})",
            self.attempt, self.max_attempts, self.endpoint
        )
    }

    /// Format final failure summary with actionable suggestions.
    pub fn format_failure(&self) -> String {
        let mut lines = vec![
            format!("[FAILED] Request failed after {} attempts", self.max_attempts),
            format!("  Last error: {}", self.error_message),
            format!("  Endpoint: {}", self.endpoint),
            "  Suggestions:".to_string(),
        ];

        for suggestion in self.format_suggestions() {
            lines.push(format!("    - {suggestion}"));
        }

        lines.join("\n")
    }

    /// Derive suggestions tailored to the current retry context.
    pub fn format_suggestions(&self) -> Vec<String> {
        let mut suggestions = vec![self.error_type.suggestion().to_string()];
        if self.error_type.is_retryable() {
            suggestions.push(format!(
                "Try increasing --max-retries (current: {})",
                self.max_attempts
            ));
        }
        suggestions.push("Check exchange status with `get /exchange/status`".to_string());
        suggestions
    }
}
