//! Bulk collection executor
//!
//! A run moves through `LIST_PAGES → FETCH_DETAILS → FINALIZE`, optionally
//! starting from a checkpoint. Listing pages are walked to completion before
//! any detail is fetched. Details are fetched in chunks through the
//! [`BatchFetcher`]; successes are added to the checkpoint state and
//! failures go to an in-memory failed set that is never persisted, so a
//! later resume retries them.
//!
//! The checkpoint is saved every `checkpoint_interval` successful records
//! and always on finalize, abort and interruption. It is deleted only after
//! the exporter confirms the records are durable and the listing walk ended
//! on its own rather than at the page limit.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn, Instrument};

use super::config::{
    CHECKPOINT_INTERVAL, DEFAULT_CHUNK_DELAY, DEFAULT_CHUNK_SIZE, MAX_CONSECUTIVE_ERRORS,
    PAGE_RETRY_DELAY,
};
use super::job::{CollectionJob, JobProgress};
use super::progress::ProgressTracker;
use super::CollectError;
use crate::fetcher::pagination::{Page, MAX_PAGES};
use crate::fetcher::{BatchFetcher, BatchItem, BatchItemError};
use crate::metrics::CollectionMetrics;
use crate::output::Exporter;
use crate::resume::{CheckpointState, CheckpointStore, RunLock};
use crate::shutdown::SharedShutdown;

/// Bulk collection settings
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// Checkpoint file location
    pub checkpoint_path: PathBuf,
    /// Start from the checkpoint if one exists
    pub resume: bool,
    /// Remove the checkpoint once the export is confirmed
    pub delete_checkpoint_on_success: bool,
    /// Keys per detail-fetch chunk
    pub chunk_size: usize,
    /// Pause between chunks, on top of the rate limiter
    pub chunk_delay: Duration,
    /// Save after this many new records
    pub checkpoint_interval: usize,
    /// Consecutive failures that abort the run
    pub max_consecutive_errors: u32,
    /// Pause before re-requesting a failed listing page
    pub page_retry_delay: Duration,
    /// Listing pages followed before the walk is cut off
    pub max_pages: usize,
}

impl CollectorConfig {
    pub fn new(checkpoint_path: impl Into<PathBuf>) -> Self {
        Self {
            checkpoint_path: checkpoint_path.into(),
            resume: false,
            delete_checkpoint_on_success: true,
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_delay: DEFAULT_CHUNK_DELAY,
            checkpoint_interval: CHECKPOINT_INTERVAL,
            max_consecutive_errors: MAX_CONSECUTIVE_ERRORS,
            page_retry_delay: PAGE_RETRY_DELAY,
            max_pages: MAX_PAGES,
        }
    }

    pub fn with_resume(mut self, resume: bool) -> Self {
        self.resume = resume;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = delay;
        self
    }

    pub fn with_checkpoint_interval(mut self, interval: usize) -> Self {
        self.checkpoint_interval = interval.max(1);
        self
    }

    pub fn with_max_consecutive_errors(mut self, max: u32) -> Self {
        self.max_consecutive_errors = max.max(1);
        self
    }

    pub fn with_page_retry_delay(mut self, delay: Duration) -> Self {
        self.page_retry_delay = delay;
        self
    }

    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages.max(1);
        self
    }

    pub fn keep_checkpoint(mut self) -> Self {
        self.delete_checkpoint_on_success = false;
        self
    }
}

/// How a run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectionStatus {
    /// All keys settled and records handed to the exporter
    Completed,
    /// Too many consecutive failures
    Aborted { errors: u32 },
    /// Shutdown requested
    Interrupted,
}

impl CollectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Aborted { .. } => "aborted",
            Self::Interrupted => "interrupted",
        }
    }
}

/// Result of one run
#[derive(Debug, Clone)]
pub struct CollectionSummary {
    pub status: CollectionStatus,
    /// Records held at the end, resumed ones included
    pub records: usize,
    /// Keys settled: records plus this run's failures
    pub processed: usize,
    /// Keys that failed this run, sorted
    pub failed: Vec<String>,
    /// Listing pages fetched
    pub pages: usize,
    pub checkpoints_written: usize,
    /// Exporter confirmed the records are durable
    pub export_confirmed: bool,
    /// Listing stopped at the page limit with a cursor still pending
    pub listing_truncated: bool,
}

/// Progress after one detail chunk
#[derive(Debug, Clone)]
pub struct ChunkReport {
    /// Zero-based chunk index within this run
    pub chunk: usize,
    pub chunks: usize,
    pub records: usize,
    pub failed: usize,
    /// Unique keys in the listing
    pub listed: usize,
}

/// Callback invoked after every detail chunk
pub type ChunkCallback = Arc<dyn Fn(&ChunkReport) + Send + Sync>;

/// Unique keys in listing order
struct Listing {
    keys: Vec<String>,
    truncated: bool,
}

enum Phase<T> {
    Done(T),
    Aborted(u32),
    Interrupted,
}

/// Drives a [`CollectionJob`] to completion
pub struct BulkCollector {
    fetcher: BatchFetcher,
    config: CollectorConfig,
    shutdown: Option<SharedShutdown>,
    progress_tracker: ProgressTracker,
    on_chunk: Option<ChunkCallback>,
}

impl BulkCollector {
    pub fn new(fetcher: BatchFetcher, config: CollectorConfig) -> Self {
        Self {
            fetcher,
            config,
            shutdown: None,
            progress_tracker: ProgressTracker::default(),
            on_chunk: None,
        }
    }

    /// Attach a shared shutdown handle for graceful cancellation.
    pub fn with_shutdown(mut self, shutdown: SharedShutdown) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn with_progress_tracker(mut self, tracker: ProgressTracker) -> Self {
        self.progress_tracker = tracker;
        self
    }

    /// Observe progress after every chunk
    pub fn on_chunk(mut self, callback: ChunkCallback) -> Self {
        self.on_chunk = Some(callback);
        self
    }

    pub fn config(&self) -> &CollectorConfig {
        &self.config
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown
            .as_ref()
            .map(|s| s.is_shutdown_requested())
            .unwrap_or(false)
    }

    /// Sleep for `delay`; returns `false` if shutdown interrupted it
    async fn pause(&self, delay: Duration) -> bool {
        match &self.shutdown {
            Some(shutdown) => shutdown.sleep(delay).await,
            None => {
                tokio::time::sleep(delay).await;
                true
            }
        }
    }

    /// Run the job and hand its records to `exporter`
    ///
    /// # Errors
    /// Fails before any network traffic if the job is invalid, another run
    /// holds the checkpoint, or a resume checkpoint cannot be loaded. Every
    /// later failure is reflected in the returned summary instead.
    pub async fn run(
        &self,
        job: &CollectionJob,
        exporter: &dyn Exporter,
    ) -> Result<CollectionSummary, CollectError> {
        let span = tracing::info_span!(
            "bulk_collect",
            job = %job.name,
            checkpoint = %self.config.checkpoint_path.display()
        );
        self.run_inner(job, exporter).instrument(span).await
    }

    async fn run_inner(
        &self,
        job: &CollectionJob,
        exporter: &dyn Exporter,
    ) -> Result<CollectionSummary, CollectError> {
        job.validate().map_err(CollectError::InvalidJob)?;

        let _run_lock = RunLock::try_acquire(&self.config.checkpoint_path)?;
        let mut store = CheckpointStore::new(&self.config.checkpoint_path);
        let mut state = store.load_or_new(&job.name, &job.key_field, self.config.resume)?;

        let metrics = CollectionMetrics::start(&job.name);
        let mut progress = JobProgress {
            resumed: state.len(),
            records: state.len(),
            ..JobProgress::default()
        };
        let mut failed: HashSet<String> = HashSet::new();

        info!(resumed = state.len(), exporter = %exporter.describe(), "Starting collection");

        let listing = match self.list_keys(job, &mut progress).await {
            Phase::Done(listing) => listing,
            Phase::Aborted(errors) => {
                return Ok(self.stop(
                    CollectionStatus::Aborted { errors },
                    &mut store,
                    &state,
                    &failed,
                    &progress,
                    &metrics,
                ));
            }
            Phase::Interrupted => {
                return Ok(self.stop(
                    CollectionStatus::Interrupted,
                    &mut store,
                    &state,
                    &failed,
                    &progress,
                    &metrics,
                ));
            }
        };

        progress.listed = listing.keys.len();
        let pending: Vec<String> = listing
            .keys
            .into_iter()
            .filter(|key| !state.is_processed(key))
            .collect();

        info!(
            listed = progress.listed,
            already_collected = progress.listed - pending.len(),
            pending = pending.len(),
            "Listing complete"
        );

        match self
            .fetch_details(job, pending, &mut state, &mut store, &mut failed, &mut progress)
            .await
        {
            Phase::Done(()) => {}
            Phase::Aborted(errors) => {
                return Ok(self.stop(
                    CollectionStatus::Aborted { errors },
                    &mut store,
                    &state,
                    &failed,
                    &progress,
                    &metrics,
                ));
            }
            Phase::Interrupted => {
                return Ok(self.stop(
                    CollectionStatus::Interrupted,
                    &mut store,
                    &state,
                    &failed,
                    &progress,
                    &metrics,
                ));
            }
        }

        store.save(&state);

        let export_confirmed = match exporter.export(state.records()).await {
            Ok(()) => true,
            Err(e) => {
                error!(error = %e, exporter = %exporter.describe(), "Export failed; checkpoint kept");
                false
            }
        };

        if listing.truncated {
            warn!(
                pages = progress.pages,
                "Listing stopped at the page limit; checkpoint kept"
            );
        } else if export_confirmed && self.config.delete_checkpoint_on_success {
            if let Err(e) = store.delete() {
                warn!(error = %e, "Failed to remove checkpoint after export");
            }
        }

        let mut summary = summarize(CollectionStatus::Completed, &store, &state, &failed, &progress);
        summary.export_confirmed = export_confirmed;
        summary.listing_truncated = listing.truncated;
        metrics.record_finished(summary.status.as_str(), summary.records);

        info!(
            records = summary.records,
            failed = summary.failed.len(),
            pages = summary.pages,
            export_confirmed,
            listing_truncated = listing.truncated,
            "Collection completed"
        );
        Ok(summary)
    }

    /// Save and build the summary for an early stop
    fn stop(
        &self,
        status: CollectionStatus,
        store: &mut CheckpointStore,
        state: &CheckpointState,
        failed: &HashSet<String>,
        progress: &JobProgress,
        metrics: &CollectionMetrics,
    ) -> CollectionSummary {
        store.save(state);
        let summary = summarize(status, store, state, failed, progress);
        metrics.record_finished(summary.status.as_str(), summary.records);

        match &summary.status {
            CollectionStatus::Interrupted => info!(
                records = summary.records,
                "Shutdown requested - progress saved, rerun with resume to continue"
            ),
            status => error!(
                ?status,
                records = summary.records,
                "Collection aborted - progress saved, rerun with resume to continue"
            ),
        }
        summary
    }

    /// Walk listing pages until the cursor runs out or `max_pages` is reached
    async fn list_keys(&self, job: &CollectionJob, progress: &mut JobProgress) -> Phase<Listing> {
        let client = self.fetcher.client();
        let mut keys = Vec::new();
        let mut seen = HashSet::new();
        let mut cursor: Option<String> = None;

        loop {
            if self.shutdown_requested() {
                return Phase::Interrupted;
            }

            if progress.pages >= self.config.max_pages {
                warn!(
                    pages = progress.pages,
                    cursor = cursor.as_deref().unwrap_or(""),
                    "Page limit reached, listing truncated"
                );
                return Phase::Done(Listing { keys, truncated: true });
            }

            let request = job.list_request(cursor.as_deref());
            let page = match client.execute(&request).await {
                Ok(response) => Page::from_response(response, &job.items_field),
                Err(e) => Err(e),
            };

            let page = match page {
                Ok(page) => page,
                Err(e) => {
                    let errors = progress.record_failure();
                    warn!(
                        page = progress.pages + 1,
                        cursor = cursor.as_deref().unwrap_or(""),
                        consecutive_errors = errors,
                        error = %e,
                        "Listing page failed"
                    );
                    if errors >= self.config.max_consecutive_errors {
                        return Phase::Aborted(errors);
                    }
                    if !self.pause(self.config.page_retry_delay).await {
                        return Phase::Interrupted;
                    }
                    continue;
                }
            };

            progress.record_success();
            progress.pages += 1;

            let item_count = page.items.len();
            for item in &page.items {
                match job.key_of(item) {
                    Some(key) => {
                        if seen.insert(key.to_string()) {
                            keys.push(key.to_string());
                        }
                    }
                    None => warn!(key_field = %job.key_field, "Listed item has no key, skipped"),
                }
            }

            debug!(
                page = progress.pages,
                items = item_count,
                total_keys = keys.len(),
                "Listing page fetched"
            );

            match page.cursor {
                Some(next) if item_count > 0 => cursor = Some(next),
                _ => {
                    debug!(page = progress.pages, "No further cursor, listing finished");
                    break;
                }
            }
        }

        Phase::Done(Listing {
            keys,
            truncated: false,
        })
    }

    async fn fetch_details(
        &self,
        job: &CollectionJob,
        pending: Vec<String>,
        state: &mut CheckpointState,
        store: &mut CheckpointStore,
        failed: &mut HashSet<String>,
        progress: &mut JobProgress,
    ) -> Phase<()> {
        let chunks: Vec<&[String]> = pending.chunks(self.config.chunk_size).collect();
        let chunk_count = chunks.len();
        let mut since_checkpoint = 0usize;
        let mut progress_state = self
            .progress_tracker
            .create_state(progress.listed, progress.processed());

        for (index, chunk) in chunks.into_iter().enumerate() {
            if index > 0 && !self.pause(self.config.chunk_delay).await {
                return Phase::Interrupted;
            }
            if self.shutdown_requested() {
                return Phase::Interrupted;
            }

            let results = self.fetch_chunk(job, chunk).await;
            let mut threshold_hit = None;

            for (key, result) in chunk.iter().zip(results) {
                let stored = match result {
                    Ok(response) => match state.add_record(key, job.extract_record(response)) {
                        Ok(_) => true,
                        Err(e) => {
                            warn!(key = %key, error = %e, "Record rejected");
                            false
                        }
                    },
                    Err(e) => {
                        warn!(key = %key, error = %e.source, "Detail fetch failed");
                        false
                    }
                };

                if stored {
                    progress.record_success();
                    since_checkpoint += 1;
                } else {
                    failed.insert(key.clone());
                    let errors = progress.record_failure();
                    if errors >= self.config.max_consecutive_errors {
                        threshold_hit.get_or_insert(errors);
                    }
                }

                if since_checkpoint >= self.config.checkpoint_interval {
                    store.save(state);
                    since_checkpoint = 0;
                }
            }

            progress.records = state.len();
            progress.failed = failed.len();

            progress_state.update(chunk.len());
            progress_state.set_phase(Some(format!("chunk {}/{}", index + 1, chunk_count)));
            if progress_state.should_emit_update() {
                info!("{}", progress_state.format_progress());
                progress_state.mark_emitted();
            }

            if let Some(callback) = &self.on_chunk {
                callback(&ChunkReport {
                    chunk: index,
                    chunks: chunk_count,
                    records: progress.records,
                    failed: progress.failed,
                    listed: progress.listed,
                });
            }

            if let Some(errors) = threshold_hit {
                return Phase::Aborted(errors);
            }
        }

        Phase::Done(())
    }

    /// Fetch one chunk; results align with `keys`
    async fn fetch_chunk(&self, job: &CollectionJob, keys: &[String]) -> Vec<BatchItem> {
        let mut slots: Vec<Option<BatchItem>> = Vec::with_capacity(keys.len());
        let mut requests = Vec::with_capacity(keys.len());
        let mut positions = Vec::with_capacity(keys.len());

        for (index, key) in keys.iter().enumerate() {
            match job.detail_request(key) {
                Ok(request) => {
                    positions.push(index);
                    requests.push(request);
                    slots.push(None);
                }
                Err(source) => slots.push(Some(Err(BatchItemError {
                    index,
                    path: key.clone(),
                    source,
                }))),
            }
        }

        for (position, result) in positions.into_iter().zip(self.fetcher.batch(requests).await) {
            slots[position] = Some(result);
        }

        slots.into_iter().flatten().collect()
    }
}

fn summarize(
    status: CollectionStatus,
    store: &CheckpointStore,
    state: &CheckpointState,
    failed: &HashSet<String>,
    progress: &JobProgress,
) -> CollectionSummary {
    let mut failed: Vec<String> = failed.iter().cloned().collect();
    failed.sort();
    CollectionSummary {
        status,
        records: state.len(),
        processed: state.len() + failed.len(),
        failed,
        pages: progress.pages,
        checkpoints_written: store.writes(),
        export_confirmed: false,
        listing_truncated: false,
    }
}
