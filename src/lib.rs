//! # Kalshi Collector Library
//!
//! A resilient client for the Kalshi prediction-market exchange: signed REST
//! calls, parallel batch fetching and checkpointed bulk collection, plus a
//! self-healing WebSocket subscription stream.
//!
//! ## Features
//!
//! - **Request Signing**: RSA-PSS (SHA-256) signatures over
//!   `timestamp + METHOD + path` on every REST call and the WebSocket upgrade
//! - **Rate Limiting**: one shared limiter per client, sliding-window or evenly
//!   spaced
//! - **Batch Fetching**: bounded-concurrency fan-out that keeps input order and
//!   isolates per-item failures
//! - **Resume Capability**: atomic checkpoints so an interrupted or aborted
//!   collection continues where it stopped
//! - **Streaming**: authenticated WebSocket with handler dispatch and
//!   exponential reconnect backoff
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use kalshi_collector::auth::Credentials;
//! use kalshi_collector::fetcher::{ClientConfig, Environment, KalshiHttpClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pem = std::fs::read_to_string("kalshi.pem")?;
//! let credentials = Arc::new(Credentials::from_pem("my-key-id", &pem)?);
//! let client = KalshiHttpClient::new(ClientConfig::new(Environment::Demo), credentials)?;
//!
//! let status = client.get_exchange_status().await?;
//! println!("{status}");
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`auth`] - Credentials and request signing
//! - [`fetcher`] - Signed HTTP transport, pagination and batch fetching
//! - [`downloader`] - Rate limiting and the bulk collection state machine
//! - [`resume`] - Checkpoint files and the run lock
//! - [`output`] - Exporters for collected records
//! - [`stream`] - WebSocket streaming client
//! - [`shutdown`] - Graceful cancellation
//! - [`metrics`] - Prometheus metrics

#![warn(clippy::all)]

/// Credentials and request signing
pub mod auth;

/// CLI command implementations
pub mod cli;

/// Bulk collection orchestration and rate limiting
pub mod downloader;

/// Signed REST transport
pub mod fetcher;

/// Observability metrics
pub mod metrics;

/// Record exporters
pub mod output;

/// Checkpointing for bulk collections
pub mod resume;

/// Graceful shutdown coordination shared across modules
pub mod shutdown;

/// WebSocket streaming
pub mod stream;

// Re-export commonly used types
pub use auth::{Credentials, Signer};
pub use downloader::{BulkCollector, CollectionJob, CollectorConfig};
pub use fetcher::{BatchFetcher, ClientConfig, Environment, KalshiHttpClient};
pub use stream::{StreamClient, StreamConfig};
