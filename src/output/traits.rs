//! Record sink trait and errors
//!
//! A sink is where the configured spider delivers its records. Sinks are
//! shared between worker threads, so implementations must be thread-safe.

use crate::spider::ScrapedRecord;
use thiserror::Error;

/// Errors that can occur while writing records
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Failed to serialize record: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// Destination for extracted records
pub trait RecordSink: Send + Sync {
    /// Writes one record
    ///
    /// # Arguments
    ///
    /// * `spider` - Name of the spider that produced the record
    /// * `record` - The record to write
    fn write(&self, spider: &str, record: &ScrapedRecord) -> OutputResult<()>;

    /// Makes every written record durable
    fn flush(&self) -> OutputResult<()>;

    /// Number of records written so far
    fn written(&self) -> u64;
}
