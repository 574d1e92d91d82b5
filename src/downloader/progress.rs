//! Progress reporting for long-running collections.
//!
//! Computes percentages and remaining-time estimates and formats the
//! periodic progress lines logged between chunks.

use std::time::{Duration, Instant};

const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_secs(60);

/// Controls how often progress lines are emitted.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    update_interval: Duration,
    min_percentage_step: f64,
}

impl ProgressTracker {
    /// Create a tracker with custom interval and percentage step.
    pub fn new(update_interval: Duration, min_percentage_step: f64) -> Self {
        Self {
            update_interval,
            min_percentage_step,
        }
    }

    /// Build a [`ProgressState`] configured with the tracker defaults.
    pub fn create_state(&self, total_expected: usize, already_done: usize) -> ProgressState {
        let mut state = ProgressState::new(total_expected);
        state.items_done = already_done;
        state.baseline = already_done;
        state.update_interval = self.update_interval;
        state.min_percentage_step = self.min_percentage_step;
        state
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new(DEFAULT_UPDATE_INTERVAL, 10.0)
    }
}

/// Progress of one detail-fetch phase.
#[derive(Debug, Clone)]
pub struct ProgressState {
    /// Keys settled so far, including those resumed from a checkpoint.
    pub items_done: usize,
    /// Keys settled before this run started; excluded from the rate.
    pub baseline: usize,
    /// Keys in the listing.
    pub total_expected: usize,
    pub start_time: Instant,
    pub last_update: Instant,
    pub update_interval: Duration,
    /// Items per second this run.
    pub current_rate: f64,
    /// Current phase label, e.g. "chunk 3/12".
    pub current_phase: Option<String>,
    pub last_reported_percentage: f64,
    pub min_percentage_step: f64,
}

impl ProgressState {
    pub fn new(total_expected: usize) -> Self {
        let now = Instant::now();
        Self {
            items_done: 0,
            baseline: 0,
            total_expected,
            start_time: now,
            last_update: now,
            update_interval: DEFAULT_UPDATE_INTERVAL,
            current_rate: 0.0,
            current_phase: None,
            last_reported_percentage: 0.0,
            min_percentage_step: 10.0,
        }
    }

    /// Count newly settled items.
    pub fn update(&mut self, new_items: usize) {
        self.items_done = self.items_done.saturating_add(new_items);
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.current_rate = self.items_done.saturating_sub(self.baseline) as f64 / elapsed;
        }
    }

    /// Whether a progress line is due, by percentage step or elapsed time.
    pub fn should_emit_update(&self) -> bool {
        if self.items_done == 0 {
            return false;
        }

        if self.percentage() - self.last_reported_percentage >= self.min_percentage_step {
            return true;
        }

        self.last_update.elapsed() >= self.update_interval
    }

    /// Call after emitting a progress line.
    pub fn mark_emitted(&mut self) {
        self.last_update = Instant::now();
        self.last_reported_percentage = self.percentage();
    }

    pub fn set_phase<S: Into<String>>(&mut self, phase: Option<S>) {
        self.current_phase = phase.map(|s| s.into());
    }

    /// Completion percentage (0-100).
    pub fn percentage(&self) -> f64 {
        if self.total_expected == 0 {
            return 100.0;
        }
        (self.items_done as f64 / self.total_expected as f64 * 100.0).min(100.0)
    }

    /// Remaining time at the current rate.
    pub fn estimate_remaining(&self) -> Option<Duration> {
        if self.current_rate <= 0.0 {
            return None;
        }
        let remaining = self.total_expected.saturating_sub(self.items_done);
        (remaining > 0).then(|| Duration::from_secs_f64(remaining as f64 / self.current_rate))
    }

    /// Human-readable progress string for logging.
    pub fn format_progress(&self) -> String {
        let mut parts = vec![format!(
            "[PROGRESS] Settled {}/{} keys - {:.1}% complete",
            self.items_done,
            self.total_expected,
            self.percentage()
        )];

        if let Some(phase) = &self.current_phase {
            parts.push(format!("({phase})"));
        }

        if self.current_rate > 0.0 {
            parts.push(format!("at {:.1} keys/sec", self.current_rate));
        }

        if let Some(remaining) = self.estimate_remaining() {
            parts.push(format!("- ~{} remaining", format_duration(remaining)));
        }

        parts.join(" ")
    }
}

fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m", secs / 60)
    } else {
        format!("{:.1}h", secs as f64 / 3600.0)
    }
}
