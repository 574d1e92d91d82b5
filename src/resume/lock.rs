//! Run lock: one collector per checkpoint
//!
//! Held for the whole bulk run on a `.run.lock` sibling of the checkpoint,
//! separate from the short-lived `.lock` taken around each save and load.

use super::state::ResumeError;
use fd_lock::RwLock;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Exclusive lock over a checkpoint for the duration of a run
///
/// Released when dropped.
pub struct RunLock {
    _lock: RwLock<File>,
    path: PathBuf,
}

impl RunLock {
    /// Take the run lock without blocking
    ///
    /// # Errors
    /// Returns [`ResumeError::LockError`] if another run holds it.
    pub fn try_acquire(checkpoint_path: &Path) -> Result<Self, ResumeError> {
        if let Some(parent) = checkpoint_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| ResumeError::IoError(e.to_string()))?;
        }

        let path = run_lock_path(checkpoint_path);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| ResumeError::LockError(format!("Failed to open run lock: {e}")))?;

        let mut lock = RwLock::new(file);
        let guard = lock.try_write().map_err(|e| {
            ResumeError::LockError(format!(
                "{} is held by another run: {e}",
                path.display()
            ))
        })?;
        // The flock stays held until the descriptor closes with `lock`.
        std::mem::forget(guard);

        debug!(path = %path.display(), "Run lock acquired");
        Ok(Self { _lock: lock, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl std::fmt::Debug for RunLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunLock").field("path", &self.path).finish()
    }
}

/// Run lock file for the checkpoint at `path`
pub fn run_lock_path(path: &Path) -> PathBuf {
    path.with_extension("run.lock")
}
