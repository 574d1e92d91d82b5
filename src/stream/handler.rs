//! Message handler registry and dispatch
//!
//! Handlers are plain synchronous callbacks. The dispatcher takes a snapshot
//! of the registry for every message and runs each handler on the blocking
//! pool, so a slow or panicking handler never stalls the socket read loop.
//! The queue in front of the dispatcher is bounded; the read loop offers
//! messages with `try_send` and drops them when it is full.

use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::metrics;

/// Error returned by a message handler; logged and otherwise ignored
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct HandlerError(pub String);

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

pub type HandlerResult = Result<(), HandlerError>;

/// Callback invoked with every decoded message
pub type Handler = Arc<dyn Fn(&Value) -> HandlerResult + Send + Sync>;

/// Stable handle for removing a handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

type Entries = Arc<Vec<(HandlerId, Handler)>>;

/// Copy-on-write list of handlers
///
/// Adding or removing a handler swaps in a new list; dispatch works on the
/// snapshot taken when the message arrived.
#[derive(Default)]
pub struct HandlerRegistry {
    next_id: AtomicU64,
    entries: RwLock<Entries>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<F>(&self, handler: F) -> HandlerId
    where
        F: Fn(&Value) -> HandlerResult + Send + Sync + 'static,
    {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let mut next = Vec::with_capacity(entries.len() + 1);
        next.extend(entries.iter().cloned());
        next.push((id, Arc::new(handler) as Handler));
        *entries = Arc::new(next);
        id
    }

    /// Returns whether the handler was registered
    pub fn remove(&self, id: HandlerId) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        if !entries.iter().any(|(existing, _)| *existing == id) {
            return false;
        }
        let next: Vec<_> = entries
            .iter()
            .filter(|(existing, _)| *existing != id)
            .cloned()
            .collect();
        *entries = Arc::new(next);
        true
    }

    pub fn snapshot(&self) -> Entries {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("handlers", &self.len())
            .finish()
    }
}

/// Spawn the dispatch task behind a queue of `capacity` messages; it ends
/// once every sender is dropped and the queue has drained
pub fn spawn_dispatcher(
    registry: Arc<HandlerRegistry>,
    capacity: usize,
) -> (mpsc::Sender<Value>, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<Value>(capacity.max(1));

    let task = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            dispatch(&registry, Arc::new(message)).await;
        }
        debug!("Message dispatcher stopped");
    });

    (tx, task)
}

/// Run every registered handler on `message`, in registration order
pub async fn dispatch(registry: &HandlerRegistry, message: Arc<Value>) {
    for (id, handler) in registry.snapshot().iter() {
        let handler = Arc::clone(handler);
        let message = Arc::clone(&message);

        match tokio::task::spawn_blocking(move || handler(&message)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                metrics::record_handler_error();
                warn!(handler = ?id, error = %e, "Message handler failed");
            }
            Err(join_error) => {
                metrics::record_handler_error();
                if join_error.is_panic() {
                    error!(handler = ?id, "Message handler panicked");
                } else {
                    warn!(handler = ?id, error = %join_error, "Message handler cancelled");
                }
            }
        }
    }
}
