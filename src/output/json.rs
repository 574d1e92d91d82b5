//! JSON file exporter

use async_trait::async_trait;
use serde_json::Value;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

use super::{Exporter, OutputError, OutputResult};

/// Writes all records as one JSON array, replacing the target atomically
#[derive(Debug, Clone)]
pub struct JsonFileExporter {
    path: PathBuf,
    pretty: bool,
}

impl JsonFileExporter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            pretty: false,
        }
    }

    /// Indent the output for reading by hand
    pub fn pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl Exporter for JsonFileExporter {
    async fn export(&self, records: &[Value]) -> OutputResult<()> {
        let bytes = if self.pretty {
            serde_json::to_vec_pretty(records)
        } else {
            serde_json::to_vec(records)
        }
        .map_err(|e| OutputError::SerializationError(e.to_string()))?;

        let path = self.path.clone();
        let count = records.len();
        tokio::task::spawn_blocking(move || write_atomic(&path, &bytes))
            .await
            .map_err(|e| OutputError::TaskFailed(e.to_string()))??;

        info!(path = %self.path.display(), records = count, "Records exported");
        Ok(())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> OutputResult<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent).map_err(|e| OutputError::IoError(e.to_string()))?;

    let mut temp_file = tempfile::NamedTempFile::new_in(parent)
        .map_err(|e| OutputError::IoError(format!("Failed to create temp file: {e}")))?;
    let io_err = |e: std::io::Error| OutputError::IoError(format!("Failed to write temp file: {e}"));
    temp_file.write_all(bytes).map_err(io_err)?;
    temp_file.flush().map_err(io_err)?;
    temp_file.as_file().sync_all().map_err(io_err)?;
    temp_file
        .persist(path)
        .map_err(|e| OutputError::IoError(format!("Failed to persist export: {e}")))?;
    Ok(())
}
