//! Graceful shutdown
//!
//! One [`ShutdownCoordinator`] is shared by the Ctrl+C handler, the bulk
//! collector and the stream client. Collectors stop at the next chunk or page
//! boundary with their checkpoint saved; the stream closes its socket.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// Shared handle to a shutdown coordinator.
pub type SharedShutdown = Arc<ShutdownCoordinator>;

/// Coordinates graceful shutdown across async tasks.
#[derive(Debug, Default)]
pub struct ShutdownCoordinator {
    is_shutdown: AtomicBool,
    notify: Notify,
}

impl ShutdownCoordinator {
    /// Create a new coordinator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new shared coordinator wrapped in [`Arc`].
    pub fn shared() -> SharedShutdown {
        Arc::new(Self::new())
    }

    /// Request shutdown. Notifies all registered waiters exactly once.
    pub fn request_shutdown(&self) {
        if !self.is_shutdown.swap(true, Ordering::SeqCst) {
            self.notify.notify_waiters();
        }
    }

    /// Whether shutdown has been requested.
    pub fn is_shutdown_requested(&self) -> bool {
        self.is_shutdown.load(Ordering::SeqCst)
    }

    /// Wait until shutdown is requested. Returns immediately if already set.
    pub async fn wait_for_shutdown(&self) {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        // Register before checking the flag so a request landing in between is not missed.
        notified.as_mut().enable();
        if self.is_shutdown_requested() {
            return;
        }
        notified.await;
    }

    /// Sleep for `delay` unless shutdown comes first
    ///
    /// Returns `false` when interrupted, or when shutdown was already
    /// requested (a zero delay only checks the flag).
    pub async fn sleep(&self, delay: Duration) -> bool {
        if delay.is_zero() || self.is_shutdown_requested() {
            return !self.is_shutdown_requested();
        }
        tokio::select! {
            _ = tokio::time::sleep(delay) => true,
            _ = self.wait_for_shutdown() => false,
        }
    }
}
