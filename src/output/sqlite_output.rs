//! SQLite record sink
//!
//! Records are inserted into the `records` table as JSON payloads, each with
//! the spider name, the page it came from and an RFC 3339 timestamp.

use crate::output::schema::initialize_schema;
use crate::output::traits::{OutputResult, RecordSink};
use crate::spider::ScrapedRecord;
use chrono::Utc;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Writes records to an SQLite database
pub struct SqliteSink {
    conn: Mutex<Connection>,
    written: AtomicU64,
}

impl SqliteSink {
    /// Opens (or creates) the database and its schema
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteSink)` - Successfully opened/created database
    /// * `Err(OutputError)` - Failed to open database
    pub fn open(path: &Path) -> OutputResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
        ",
        )?;

        initialize_schema(&conn)?;
        tracing::debug!("Writing records to {}", path.display());

        Ok(Self::from_connection(conn))
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn open_in_memory() -> OutputResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
            written: AtomicU64::new(0),
        }
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Counts stored records for a spider
    pub fn count_records(&self, spider: &str) -> OutputResult<u64> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM records WHERE spider = ?1",
            params![spider],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}

impl RecordSink for SqliteSink {
    fn write(&self, spider: &str, record: &ScrapedRecord) -> OutputResult<()> {
        let payload = serde_json::to_string(&record.fields)?;
        let now = Utc::now().to_rfc3339();

        self.conn().execute(
            "INSERT INTO records (spider, source_url, payload, fetched_at) VALUES (?1, ?2, ?3, ?4)",
            params![spider, record.source_url, payload, now],
        )?;
        self.written.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn flush(&self) -> OutputResult<()> {
        // Every insert is committed on its own; only the WAL needs folding back
        self.conn()
            .execute_batch("PRAGMA wal_checkpoint(PASSIVE);")?;
        Ok(())
    }

    fn written(&self) -> u64 {
        self.written.load(Ordering::Relaxed)
    }
}
