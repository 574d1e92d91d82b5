//! Bounded parallel fetching
//!
//! A batch fans its requests out through `buffer_unordered`, so at most
//! `min(BATCH_CONCURRENCY_CEILING, workers)` are in flight at once. Each
//! item goes through the retrying request path; a failure is recorded for
//! that item only and never cancels its siblings. Results come back in
//! input order.

use futures::stream::{self, StreamExt};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::downloader::config::BATCH_CONCURRENCY_CEILING;
use crate::fetcher::kalshi_http::{market_path, KalshiHttpClient, RequestDescriptor};
use crate::fetcher::{FailureKind, FetcherError};
use crate::metrics;

/// Failure of one batch item
#[derive(Debug, thiserror::Error)]
#[error("request {index} ({path}) failed: {source}")]
pub struct BatchItemError {
    /// Position of the request in the batch input
    pub index: usize,
    pub path: String,
    #[source]
    pub source: FetcherError,
}

impl BatchItemError {
    pub fn kind(&self) -> FailureKind {
        self.source.kind()
    }
}

/// Outcome of one batch item
pub type BatchItem = Result<Value, BatchItemError>;

/// Runs batches of requests against a shared client
#[derive(Debug, Clone)]
pub struct BatchFetcher {
    client: Arc<KalshiHttpClient>,
    concurrency: usize,
    retries: u32,
}

impl BatchFetcher {
    /// Batch fetcher sized from the client's worker count
    pub fn new(client: Arc<KalshiHttpClient>) -> Self {
        let concurrency = effective_concurrency(client.config().workers);
        let retries = client.config().retry.attempts;
        Self {
            client,
            concurrency,
            retries,
        }
    }

    /// Lower the in-flight bound; never raises it above the pool ceiling
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = effective_concurrency(concurrency.min(self.concurrency));
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Maximum requests in flight
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn client(&self) -> &Arc<KalshiHttpClient> {
        &self.client
    }

    /// Execute every request; output has the same length and order as the input
    pub async fn batch(&self, requests: Vec<RequestDescriptor>) -> Vec<BatchItem> {
        let total = requests.len();
        if total == 0 {
            return Vec::new();
        }

        debug!(requests = total, concurrency = self.concurrency, "Starting batch");

        let client = &self.client;
        let retries = self.retries;
        let mut completed: Vec<(usize, BatchItem)> = stream::iter(requests.into_iter().enumerate())
            .map(|(index, request)| async move {
                let result = client
                    .execute_with_retry(&request, retries)
                    .await
                    .map_err(|source| BatchItemError {
                        index,
                        path: request.path.clone(),
                        source,
                    });
                (index, result)
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        completed.sort_unstable_by_key(|(index, _)| *index);

        let failures = completed.iter().filter(|(_, r)| r.is_err()).count();
        if failures > 0 {
            warn!(requests = total, failures, "Batch finished with failures");
            metrics::record_batch_failures(failures as u64);
        }

        completed.into_iter().map(|(_, result)| result).collect()
    }

    /// Batch GET of market details by ticker, unwrapped from the `market` field
    ///
    /// Invalid tickers fail their own slot without being sent.
    pub async fn get_markets(&self, tickers: &[String]) -> Vec<BatchItem> {
        let mut results: Vec<Option<BatchItem>> = Vec::with_capacity(tickers.len());
        let mut requests = Vec::new();
        let mut positions = Vec::new();

        for (index, ticker) in tickers.iter().enumerate() {
            match market_path(ticker) {
                Ok(path) => {
                    positions.push(index);
                    requests.push(RequestDescriptor::get(path));
                    results.push(None);
                }
                Err(source) => results.push(Some(Err(BatchItemError {
                    index,
                    path: ticker.clone(),
                    source,
                }))),
            }
        }

        for (position, result) in positions.into_iter().zip(self.batch(requests).await) {
            let result = result
                .map(|response| unwrap_field(response, "market"))
                .map_err(|mut e| {
                    e.index = position;
                    e
                });
            results[position] = Some(result);
        }

        results.into_iter().flatten().collect()
    }
}

/// In-flight bound for a worker count: `1..=BATCH_CONCURRENCY_CEILING`
pub fn effective_concurrency(workers: usize) -> usize {
    workers.clamp(1, BATCH_CONCURRENCY_CEILING)
}

/// Take `field` out of an object response, or return the response unchanged
pub fn unwrap_field(mut response: Value, field: &str) -> Value {
    match response.get_mut(field) {
        Some(inner) => inner.take(),
        None => response,
    }
}
