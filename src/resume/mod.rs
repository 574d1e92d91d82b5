//! Resume capability for bulk collections
//!
//! Provides persistent checkpoint state with atomic writes and file locking.

pub mod checkpoint;
pub mod lock;
pub mod state;

pub use checkpoint::CheckpointStore;
pub use lock::RunLock;
pub use state::{CheckpointState, ResumeError};
