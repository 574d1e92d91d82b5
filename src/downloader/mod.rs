//! Bulk collection orchestration and rate limiting
//!
//! # Overview
//!
//! A bulk collection walks a cursor-paginated listing endpoint, then fetches
//! each listed key's detail record in chunks:
//!
//! 1. **Job**: what to list and fetch, see [`job::CollectionJob`]
//! 2. **Execution**: [`executor::BulkCollector`] drives the listing and
//!    detail phases and hands the records to an [`crate::output::Exporter`]
//! 3. **Rate Limiting**: every request passes through
//!    [`rate_limit::RateLimiter`] inside the HTTP client
//! 4. **Progress**: [`job::JobProgress`] counters and periodic
//!    [`progress::ProgressState`] log lines
//! 5. **Resume**: checkpoints through [`crate::resume::CheckpointStore`]
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use kalshi_collector::auth::Credentials;
//! use kalshi_collector::downloader::{BulkCollector, CollectionJob, CollectorConfig};
//! use kalshi_collector::fetcher::{BatchFetcher, ClientConfig, Environment, KalshiHttpClient};
//! use kalshi_collector::output::JsonFileExporter;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pem = std::fs::read_to_string("kalshi.pem")?;
//! let credentials = Arc::new(Credentials::from_pem("key-id", &pem)?);
//! let client = KalshiHttpClient::new(ClientConfig::new(Environment::Demo), credentials)?;
//!
//! let collector = BulkCollector::new(
//!     BatchFetcher::new(Arc::new(client)),
//!     CollectorConfig::new("markets.checkpoint.json").with_resume(true),
//! );
//! let summary = collector
//!     .run(&CollectionJob::markets(Some("open")), &JsonFileExporter::new("markets.json"))
//!     .await?;
//! println!("{} records", summary.records);
//! # Ok(())
//! # }
//! ```
//!
//! # Error Handling
//!
//! [`BulkCollector::run`] fails only before any traffic is sent (bad job,
//! checkpoint locked by another run, unreadable resume checkpoint). Page and
//! item failures, aborts and interruptions are reported through
//! [`CollectionSummary`].

pub mod config;
pub mod executor;
pub mod job;
pub mod progress;
pub mod rate_limit;

pub use executor::{
    BulkCollector, ChunkCallback, ChunkReport, CollectionStatus, CollectionSummary,
    CollectorConfig,
};
pub use job::{CollectionJob, JobProgress};
pub use progress::{ProgressState, ProgressTracker};
pub use rate_limit::{RateLimitConfig, RateLimitError, RateLimitPolicy, RateLimiter};

use crate::resume::ResumeError;

/// Errors that stop a bulk collection before it starts
#[derive(Debug, thiserror::Error)]
pub enum CollectError {
    /// Job definition rejected
    #[error("invalid job: {0}")]
    InvalidJob(String),

    /// Checkpoint locked, unreadable or for another job
    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] ResumeError),
}
