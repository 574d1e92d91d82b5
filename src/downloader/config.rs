//! Client and collection configuration defaults

use rand::Rng;
use std::time::Duration;

/// Default request ceiling per second.
/// Slightly under the Basic tier's 10 reads/second so bursts from other
/// processes on the same key do not tip the account over.
pub const DEFAULT_RATE_LIMIT_PER_SECOND: u32 = 8;

/// Default worker count; sizes the HTTP connection pool.
pub const DEFAULT_WORKERS: usize = 10;

/// Upper bound on in-flight batch calls regardless of worker count.
pub const BATCH_CONCURRENCY_CEILING: usize = 20;

/// Default attempts for the retrying single-call path.
pub const DEFAULT_RETRIES: u32 = 3;

/// Base delay for request retry backoff.
pub const RETRY_BASE_MS: u64 = 100;

/// TCP/TLS connect timeout. Short: a hung connect should fail fast.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Read timeout. Longer than connect so slow responses get more grace.
pub const READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Default number of tickers per detail-fetch chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 100;

/// Pacing delay between detail-fetch chunks, independent of the rate limiter.
pub const DEFAULT_CHUNK_DELAY: Duration = Duration::from_millis(500);

/// Save the checkpoint every N successfully collected records.
pub const CHECKPOINT_INTERVAL: usize = 1_000;

/// Consecutive page/item failures tolerated before a bulk run aborts.
pub const MAX_CONSECUTIVE_ERRORS: u32 = 10;

/// Fixed delay before re-requesting a listing page that failed.
pub const PAGE_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Page size requested from listing endpoints (server maximum is 1000).
pub const LIST_PAGE_LIMIT: u32 = 1_000;

/// Initial WebSocket reconnect delay; also the value it resets to after a good connect.
pub const RECONNECT_FLOOR: Duration = Duration::from_secs(1);

/// Maximum WebSocket reconnect delay.
pub const RECONNECT_CEILING: Duration = Duration::from_secs(30);

/// Decoded stream messages waiting for handlers; newer messages are dropped when full.
pub const DISPATCH_QUEUE_CAPACITY: usize = 1_024;

/// Retry backoff for the given attempt: `base * 2^attempt + jitter`, jitter in `[0, base)`
pub fn calculate_backoff(attempt: u32, base: Duration) -> Duration {
    let exponential = base.saturating_mul(2u32.saturating_pow(attempt));
    let base_ms = base.as_millis() as u64;
    let jitter_ms = if base_ms == 0 {
        0
    } else {
        rand::thread_rng().gen_range(0..base_ms)
    };
    exponential.saturating_add(Duration::from_millis(jitter_ms))
}
