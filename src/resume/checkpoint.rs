//! Checkpoint file handle used by a bulk run

use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::state::{CheckpointState, ResumeError};
use crate::metrics;

/// Location of one job's checkpoint plus a count of successful writes
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
    writes: usize,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            writes: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Checkpoint saves that reached disk through this handle
    pub fn writes(&self) -> usize {
        self.writes
    }

    /// Load the checkpoint and check it belongs to `job`
    pub fn load_for(&self, job: &str, key_field: &str) -> Result<CheckpointState, ResumeError> {
        let state = CheckpointState::load(&self.path)?;
        if state.job() != job || state.key_field() != key_field {
            return Err(ResumeError::JobMismatch {
                expected: format!("{job}/{key_field}"),
                found: format!("{}/{}", state.job(), state.key_field()),
            });
        }
        Ok(state)
    }

    /// State to start a run from
    ///
    /// With `resume` set and a checkpoint on disk, that checkpoint is loaded.
    /// Otherwise the run starts empty and any existing file will be
    /// overwritten at the first save.
    pub fn load_or_new(
        &self,
        job: &str,
        key_field: &str,
        resume: bool,
    ) -> Result<CheckpointState, ResumeError> {
        if resume && self.exists() {
            let state = self.load_for(job, key_field)?;
            info!(
                path = %self.path.display(),
                records = state.len(),
                "Resuming from checkpoint"
            );
            return Ok(state);
        }

        if self.exists() {
            warn!(
                path = %self.path.display(),
                "Existing checkpoint ignored; it will be overwritten"
            );
        }
        Ok(CheckpointState::new(job, key_field))
    }

    /// Save `state`, logging instead of failing
    ///
    /// Returns whether the write reached disk. A failed write leaves the
    /// previous checkpoint in place and the run continues in memory.
    pub fn save(&mut self, state: &CheckpointState) -> bool {
        match state.save(&self.path) {
            Ok(()) => {
                self.writes += 1;
                metrics::record_checkpoint_written();
                true
            }
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    records = state.len(),
                    error = %e,
                    "Checkpoint write failed, continuing in memory"
                );
                false
            }
        }
    }

    pub fn delete(&self) -> Result<(), ResumeError> {
        CheckpointState::delete(&self.path)
    }
}
