//! Checkpoint state persistence
//!
//! The state file holds the records collected so far. The set of processed
//! keys is not stored separately: it is rebuilt from the records on load, so
//! the two can never disagree.

use fd_lock::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Current checkpoint schema version
pub const SCHEMA_VERSION: &str = "1.0.0";

/// Maximum allowed state file size (1 GiB) to prevent memory exhaustion
pub const MAX_STATE_FILE_SIZE: u64 = 1024 * 1024 * 1024;

/// Progress of one bulk collection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointState {
    schema_version: String,
    job: String,
    key_field: String,
    records: Vec<Value>,
    created_at: i64,
    updated_at: i64,
    #[serde(skip)]
    processed: HashSet<String>,
}

impl CheckpointState {
    /// Empty state for `job`, whose records are keyed by `key_field`
    pub fn new(job: impl Into<String>, key_field: impl Into<String>) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            job: job.into(),
            key_field: key_field.into(),
            records: Vec::new(),
            created_at: now,
            updated_at: now,
            processed: HashSet::new(),
        }
    }

    pub fn job(&self) -> &str {
        &self.job
    }

    pub fn key_field(&self) -> &str {
        &self.key_field
    }

    pub fn records(&self) -> &[Value] {
        &self.records
    }

    /// Keys of every record held
    pub fn processed(&self) -> &HashSet<String> {
        &self.processed
    }

    pub fn is_processed(&self, key: &str) -> bool {
        self.processed.contains(key)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn created_at(&self) -> i64 {
        self.created_at
    }

    pub fn updated_at(&self) -> i64 {
        self.updated_at
    }

    /// Add a record under `key`
    ///
    /// The key is written into the record's key field when missing. Returns
    /// `false` without changing anything if the key is already present.
    ///
    /// # Errors
    /// Returns [`ResumeError::InvalidRecord`] if the record is not a JSON
    /// object or carries a different key.
    pub fn add_record(&mut self, key: &str, mut record: Value) -> Result<bool, ResumeError> {
        if self.processed.contains(key) {
            return Ok(false);
        }

        let object = record.as_object_mut().ok_or_else(|| {
            ResumeError::InvalidRecord(format!("record for '{key}' is not a JSON object"))
        })?;

        match object.get(&self.key_field) {
            None | Some(Value::Null) => {
                object.insert(self.key_field.clone(), Value::String(key.to_string()));
            }
            Some(Value::String(existing)) if existing == key => {}
            Some(other) => {
                return Err(ResumeError::InvalidRecord(format!(
                    "record for '{key}' has {} = {other}",
                    self.key_field
                )));
            }
        }

        self.processed.insert(key.to_string());
        self.records.push(record);
        self.updated_at = chrono::Utc::now().timestamp_millis();
        Ok(true)
    }

    /// Consume the state, returning its records
    pub fn into_records(self) -> Vec<Value> {
        self.records
    }

    /// Validate schema version (accepts current version only)
    pub fn validate_schema_version(&self) -> Result<(), ResumeError> {
        if self.schema_version != SCHEMA_VERSION {
            return Err(ResumeError::SchemaVersionMismatch {
                expected: SCHEMA_VERSION.to_string(),
                found: self.schema_version.clone(),
            });
        }
        Ok(())
    }

    fn rebuild_processed(&mut self) -> Result<(), ResumeError> {
        let mut processed = HashSet::with_capacity(self.records.len());
        for (index, record) in self.records.iter().enumerate() {
            let key = record
                .get(&self.key_field)
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    ResumeError::InvalidRecord(format!(
                        "record {index} has no string '{}' field",
                        self.key_field
                    ))
                })?;
            if !processed.insert(key.to_string()) {
                return Err(ResumeError::InvalidRecord(format!(
                    "duplicate key '{key}' at record {index}"
                )));
            }
        }
        self.processed = processed;
        Ok(())
    }

    /// Save state to file with atomic writes and file locking
    ///
    /// Writes a temp file in the same directory, syncs it, renames it over
    /// `path` and syncs the directory, all under an exclusive lock on the
    /// `.lock` sibling.
    pub fn save(&self, path: &Path) -> Result<(), ResumeError> {
        debug!(
            path = %path.display(),
            records = self.records.len(),
            "Saving checkpoint"
        );

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| ResumeError::IoError(e.to_string()))?;
        }

        let json = serde_json::to_vec(self)
            .map_err(|e| ResumeError::SerializationError(e.to_string()))?;

        let lock_file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(lock_path(path))
            .map_err(|e| ResumeError::LockError(format!("Failed to create lock file: {e}")))?;

        let mut lock = RwLock::new(lock_file);
        let _guard = lock
            .write()
            .map_err(|e| ResumeError::LockError(format!("Failed to acquire write lock: {e}")))?;

        let parent_dir = parent_dir(path);
        let mut temp_file = tempfile::NamedTempFile::new_in(parent_dir)
            .map_err(|e| ResumeError::IoError(format!("Failed to create temp file: {e}")))?;

        temp_file
            .write_all(&json)
            .map_err(|e| ResumeError::IoError(format!("Failed to write to temp file: {e}")))?;
        temp_file
            .flush()
            .map_err(|e| ResumeError::IoError(format!("Failed to flush temp file: {e}")))?;
        temp_file
            .as_file()
            .sync_all()
            .map_err(|e| ResumeError::IoError(format!("Failed to sync temp file: {e}")))?;

        temp_file
            .persist(path)
            .map_err(|e| ResumeError::IoError(format!("Failed to persist temp file: {e}")))?;

        if let Ok(dir) = std::fs::File::open(parent_dir) {
            let _ = dir.sync_all();
        }

        info!(
            path = %path.display(),
            records = self.records.len(),
            "Checkpoint saved"
        );
        Ok(())
    }

    /// Load state from file under a shared lock
    pub fn load(path: &Path) -> Result<Self, ResumeError> {
        debug!(path = %path.display(), "Loading checkpoint");

        let lock_file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(lock_path(path))
            .map_err(|e| ResumeError::LockError(format!("Failed to create lock file: {e}")))?;

        let lock = RwLock::new(lock_file);
        let _guard = lock
            .read()
            .map_err(|e| ResumeError::LockError(format!("Failed to acquire read lock: {e}")))?;

        let metadata = std::fs::metadata(path).map_err(|e| ResumeError::IoError(e.to_string()))?;
        if metadata.len() > MAX_STATE_FILE_SIZE {
            return Err(ResumeError::StateTooLarge {
                size: metadata.len(),
                max: MAX_STATE_FILE_SIZE,
            });
        }

        let contents = std::fs::read(path).map_err(|e| ResumeError::IoError(e.to_string()))?;

        let mut state: CheckpointState = serde_json::from_slice(&contents).map_err(|e| {
            warn!(error = %e, "Failed to deserialize checkpoint");
            ResumeError::DeserializationError(e.to_string())
        })?;

        state.validate_schema_version()?;
        state.rebuild_processed()?;

        info!(
            path = %path.display(),
            job = %state.job,
            records = state.records.len(),
            "Checkpoint loaded"
        );
        Ok(state)
    }

    /// Remove the state file and its lock file; missing files are not an error
    pub fn delete(path: &Path) -> Result<(), ResumeError> {
        for target in [path.to_path_buf(), lock_path(path)] {
            match std::fs::remove_file(&target) {
                Ok(()) => debug!(path = %target.display(), "Removed"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(ResumeError::IoError(e.to_string())),
            }
        }
        info!(path = %path.display(), "Checkpoint deleted");
        Ok(())
    }
}

/// Lock file guarding reads and writes of the checkpoint at `path`
pub fn lock_path(path: &Path) -> PathBuf {
    path.with_extension("lock")
}

fn parent_dir(path: &Path) -> &Path {
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
}

/// Errors related to checkpoint state
#[derive(Debug, thiserror::Error)]
pub enum ResumeError {
    /// Schema version mismatch
    #[error("schema version mismatch: expected {expected}, found {found}")]
    SchemaVersionMismatch { expected: String, found: String },

    /// Checkpoint belongs to another job
    #[error("checkpoint belongs to job '{found}', expected '{expected}'")]
    JobMismatch { expected: String, found: String },

    /// State file too large
    #[error("state file too large: {size} bytes (max: {max} bytes)")]
    StateTooLarge { size: u64, max: u64 },

    /// Record cannot be keyed
    #[error("invalid record: {0}")]
    InvalidRecord(String),

    /// IO error
    #[error("IO error: {0}")]
    IoError(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// Deserialization error
    #[error("deserialization error: {0}")]
    DeserializationError(String),

    /// Lock error
    #[error("lock error: {0}")]
    LockError(String),
}
