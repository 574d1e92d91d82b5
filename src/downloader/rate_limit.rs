//! Request rate limiting
//!
//! Two policies share one serialization point per limiter instance:
//!
//! - **Adaptive**: tracks issuance instants over a rolling one-second window.
//!   Bursts below the ceiling pass untouched; once the window is full the
//!   caller waits until the oldest entry ages out.
//! - **Even spacing**: every call waits `1s / ceiling`, trading burst
//!   tolerance for a predictable cadence.
//!
//! The window lives behind a `tokio::sync::Mutex` that is held across the
//! wait, so two callers can never both observe a free slot and both proceed.

use std::collections::VecDeque;
use std::fmt;
use tokio::sync::Mutex;
use tokio::time::{sleep, sleep_until, Duration, Instant};
use tracing::debug;

use super::config::DEFAULT_RATE_LIMIT_PER_SECOND;
use crate::metrics;

/// Length of the rolling window
pub const RATE_WINDOW: Duration = Duration::from_millis(1000);

/// How the limiter spaces requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RateLimitPolicy {
    /// Rolling-window limiter: zero delay until the ceiling is reached
    #[default]
    Adaptive,
    /// Fixed `1s / ceiling` delay before every call
    EvenSpacing,
}

/// Rate limiter configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Maximum requests per second
    pub ceiling: u32,
    /// Spacing policy
    pub policy: RateLimitPolicy,
}

impl RateLimitConfig {
    /// Check the configuration before building a limiter
    pub fn validate(&self) -> Result<(), RateLimitError> {
        if self.ceiling == 0 {
            return Err(RateLimitError::InvalidCeiling);
        }
        Ok(())
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            ceiling: DEFAULT_RATE_LIMIT_PER_SECOND,
            policy: RateLimitPolicy::Adaptive,
        }
    }
}

/// Rate limiter shared by every request issued through one client
pub struct RateLimiter {
    ceiling: u32,
    policy: RateLimitPolicy,
    window: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    /// Adaptive rolling-window limiter
    pub fn adaptive(ceiling: u32) -> Result<Self, RateLimitError> {
        Self::from_config(RateLimitConfig {
            ceiling,
            policy: RateLimitPolicy::Adaptive,
        })
    }

    /// Evenly spaced limiter
    pub fn even_spacing(ceiling: u32) -> Result<Self, RateLimitError> {
        Self::from_config(RateLimitConfig {
            ceiling,
            policy: RateLimitPolicy::EvenSpacing,
        })
    }

    /// Build from configuration
    ///
    /// # Errors
    /// Returns [`RateLimitError::InvalidCeiling`] for a zero ceiling.
    pub fn from_config(config: RateLimitConfig) -> Result<Self, RateLimitError> {
        config.validate()?;
        Ok(Self {
            ceiling: config.ceiling,
            policy: config.policy,
            window: Mutex::new(VecDeque::with_capacity(config.ceiling as usize + 1)),
        })
    }

    /// Configured requests-per-second ceiling
    pub fn ceiling(&self) -> u32 {
        self.ceiling
    }

    /// Configured policy
    pub fn policy(&self) -> RateLimitPolicy {
        self.policy
    }

    /// Check if this is an adaptive limiter
    pub fn is_adaptive(&self) -> bool {
        self.policy == RateLimitPolicy::Adaptive
    }

    /// Delay applied before every call under even spacing
    pub fn spacing(&self) -> Duration {
        RATE_WINDOW / self.ceiling
    }

    /// Wait until the next request may be issued
    ///
    /// Returns how long the caller was held back, including time spent
    /// queued behind other callers.
    pub async fn acquire(&self) -> Duration {
        let started = Instant::now();
        let mut window = self.window.lock().await;

        match self.policy {
            RateLimitPolicy::Adaptive => loop {
                let now = Instant::now();
                prune(&mut window, now);

                if window.len() < self.ceiling as usize {
                    window.push_back(now);
                    break;
                }

                if let Some(&oldest) = window.front() {
                    let resume_at = oldest + RATE_WINDOW;
                    debug!(
                        in_window = window.len(),
                        ceiling = self.ceiling,
                        wait_ms = resume_at.saturating_duration_since(now).as_millis(),
                        "Rate ceiling reached, waiting for window to roll"
                    );
                    sleep_until(resume_at).await;
                }
            },
            RateLimitPolicy::EvenSpacing => {
                sleep(self.spacing()).await;
                let now = Instant::now();
                prune(&mut window, now);
                window.push_back(now);
            }
        }

        let waited = started.elapsed();
        metrics::record_rate_limit_wait(waited);
        waited
    }

    /// Number of requests issued within the last window
    pub async fn in_window(&self) -> usize {
        let mut window = self.window.lock().await;
        prune(&mut window, Instant::now());
        window.len()
    }
}

impl fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimiter")
            .field("ceiling", &self.ceiling)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

fn prune(window: &mut VecDeque<Instant>, now: Instant) {
    while let Some(&oldest) = window.front() {
        if now.saturating_duration_since(oldest) >= RATE_WINDOW {
            window.pop_front();
        } else {
            break;
        }
    }
}

/// Rate limiter errors
#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    /// Ceiling of zero requests per second
    #[error("rate limit ceiling must be at least 1 request per second")]
    InvalidCeiling,
}
