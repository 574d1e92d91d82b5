//! CLI error types and conversions

use crate::auth::SigningError;
use crate::downloader::CollectError;
use crate::fetcher::FetcherError;
use crate::metrics::MetricsError;
use crate::stream::StreamError;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Private key could not be loaded
    #[error("signing error: {0}")]
    Signing(#[from] SigningError),

    #[error("request failed: {0}")]
    Fetcher(#[from] FetcherError),

    /// Collection could not start
    #[error("collection error: {0}")]
    Collect(#[from] CollectError),

    #[error("stream error: {0}")]
    Stream(#[from] StreamError),

    #[error("metrics error: {0}")]
    Metrics(#[from] MetricsError),

    /// Collection stopped after too many consecutive failures
    #[error("collection aborted after {errors} consecutive errors; rerun with --resume")]
    CollectionAborted { errors: u32 },

    /// Records collected but the output file was not written
    #[error("export to {0} failed; checkpoint kept, rerun with --resume")]
    ExportFailed(String),

    /// Listing cut off at the page limit; records written but incomplete
    #[error("listing stopped after {pages} pages; output is incomplete, checkpoint kept")]
    ListingTruncated { pages: usize },

    /// Invalid argument
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    ConfigurationError(String),
}
