//! Record exporters

use async_trait::async_trait;
use serde_json::Value;

pub mod json;

pub use json::JsonFileExporter;

/// Exporter errors
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    /// IO error
    #[error("IO error: {0}")]
    IoError(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// Export task did not finish
    #[error("export task failed: {0}")]
    TaskFailed(String),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// Destination for the records of a finished collection
///
/// Returning `Ok` confirms the records are durable; only then may the
/// collector delete its checkpoint.
#[async_trait]
pub trait Exporter: Send + Sync {
    /// Write every record
    async fn export(&self, records: &[Value]) -> OutputResult<()>;

    /// Short description for logs, such as the target path
    fn describe(&self) -> String;
}
