//! JSON Lines record sink
//!
//! Each record becomes one line:
//! `{"spider": ..., "source_url": ..., "fetched_at": ..., "fields": {...}}`

use crate::output::traits::{OutputResult, RecordSink};
use crate::spider::ScrapedRecord;
use chrono::Utc;
use serde_json::json;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Appends records to a `.jsonl` file
pub struct JsonLinesSink {
    writer: Mutex<BufWriter<File>>,
    written: AtomicU64,
}

impl JsonLinesSink {
    /// Opens (or creates) the output file in append mode
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the output file
    ///
    /// # Returns
    ///
    /// * `Ok(JsonLinesSink)` - The file is open for appending
    /// * `Err(OutputError)` - The file could not be opened
    pub fn open(path: &Path) -> OutputResult<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        tracing::debug!("Writing records to {}", path.display());

        Ok(Self {
            writer: Mutex::new(BufWriter::new(file)),
            written: AtomicU64::new(0),
        })
    }

    fn writer(&self) -> MutexGuard<'_, BufWriter<File>> {
        self.writer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl RecordSink for JsonLinesSink {
    fn write(&self, spider: &str, record: &ScrapedRecord) -> OutputResult<()> {
        let line = serde_json::to_string(&json!({
            "spider": spider,
            "source_url": record.source_url,
            "fetched_at": Utc::now().to_rfc3339(),
            "fields": record.fields,
        }))?;

        let mut writer = self.writer();
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
        self.written.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn flush(&self) -> OutputResult<()> {
        self.writer().flush()?;
        Ok(())
    }

    fn written(&self) -> u64 {
        self.written.load(Ordering::Relaxed)
    }
}
