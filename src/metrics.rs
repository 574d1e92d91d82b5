//! Observability metrics
//!
//! Counters and histograms are emitted through the `metrics` facade and are
//! no-ops until a recorder is installed. The CLI installs the Prometheus
//! exporter when `--metrics-addr` is given.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::OnceCell;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tracing::{debug, info};

static METRICS_INITIALIZED: OnceCell<SocketAddr> = OnceCell::new();

/// Metrics setup errors
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("failed to install Prometheus exporter on {addr}: {reason}")]
    Install { addr: SocketAddr, reason: String },
}

/// Install the Prometheus exporter and register metric descriptions
///
/// Idempotent: later calls return immediately.
pub fn init_metrics(addr: SocketAddr) -> Result<(), MetricsError> {
    if let Some(existing) = METRICS_INITIALIZED.get() {
        debug!(%existing, "Metrics already initialized, skipping");
        return Ok(());
    }

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| MetricsError::Install {
            addr,
            reason: e.to_string(),
        })?;

    describe_counter!("http_requests_total", Unit::Count, "HTTP requests sent to the trade API");
    describe_histogram!(
        "http_request_duration_seconds",
        Unit::Seconds,
        "HTTP request duration in seconds"
    );
    describe_counter!("http_retries_total", Unit::Count, "Retry attempts on the retrying path");
    describe_histogram!(
        "retry_backoff_duration_seconds",
        Unit::Seconds,
        "Backoff slept before a retry"
    );
    describe_counter!(
        "http_retries_exhausted_total",
        Unit::Count,
        "Requests that failed after every retry"
    );
    describe_histogram!(
        "rate_limit_wait_seconds",
        Unit::Seconds,
        "Time callers were held back by the rate limiter"
    );
    describe_counter!("batch_item_failures_total", Unit::Count, "Failed batch items");
    describe_counter!("checkpoints_written_total", Unit::Count, "Checkpoint saves that reached disk");
    describe_counter!("collections_total", Unit::Count, "Bulk collections by final status");
    describe_counter!("stream_reconnects_total", Unit::Count, "WebSocket reconnect attempts");
    describe_counter!("stream_messages_total", Unit::Count, "WebSocket messages dispatched");
    describe_counter!(
        "stream_messages_dropped_total",
        Unit::Count,
        "WebSocket messages dropped because the dispatch queue was full"
    );
    describe_counter!("stream_handler_errors_total", Unit::Count, "Handler failures and panics");

    let _ = METRICS_INITIALIZED.set(addr);
    info!(%addr, "Metrics exporter listening");
    Ok(())
}

/// Check if the exporter was installed
pub fn is_initialized() -> bool {
    METRICS_INITIALIZED.get().is_some()
}

/// Record one completed HTTP exchange
pub fn record_http_request(method: &str, status: u16, duration: Duration) {
    counter!(
        "http_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
    )
    .increment(1);
    histogram!("http_request_duration_seconds", "method" => method.to_string())
        .record(duration.as_secs_f64());
}

/// Record a retry and the backoff before it
pub fn record_retry(backoff: Duration) {
    counter!("http_retries_total").increment(1);
    histogram!("retry_backoff_duration_seconds").record(backoff.as_secs_f64());
}

pub fn record_retries_exhausted() {
    counter!("http_retries_exhausted_total").increment(1);
}

pub fn record_rate_limit_wait(waited: Duration) {
    histogram!("rate_limit_wait_seconds").record(waited.as_secs_f64());
}

pub fn record_batch_failures(count: u64) {
    counter!("batch_item_failures_total").increment(count);
}

pub fn record_checkpoint_written() {
    counter!("checkpoints_written_total").increment(1);
}

pub fn record_stream_reconnect() {
    counter!("stream_reconnects_total").increment(1);
}

pub fn record_stream_message() {
    counter!("stream_messages_total").increment(1);
}

pub fn record_stream_message_dropped() {
    counter!("stream_messages_dropped_total").increment(1);
}

pub fn record_handler_error() {
    counter!("stream_handler_errors_total").increment(1);
}

/// Timing and outcome of one bulk collection
pub struct CollectionMetrics {
    job: String,
    start_time: Instant,
}

impl CollectionMetrics {
    pub fn start(job: impl Into<String>) -> Self {
        Self {
            job: job.into(),
            start_time: Instant::now(),
        }
    }

    /// Record the final status label (`completed`, `aborted`, `interrupted`)
    pub fn record_finished(&self, status: &'static str, records: usize) {
        let elapsed = self.start_time.elapsed();
        counter!("collections_total", "job" => self.job.clone(), "status" => status).increment(1);
        histogram!("collection_duration_seconds", "job" => self.job.clone())
            .record(elapsed.as_secs_f64());
        info!(
            job = %self.job,
            status,
            records,
            elapsed_secs = elapsed.as_secs_f64(),
            "Collection metrics recorded"
        );
    }
}
