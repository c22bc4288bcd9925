//! Output module for delivering records and reporting runs
//!
//! This module handles:
//! - Writing extracted records as JSON Lines or SQLite rows
//! - Summarizing the per-stage counters of a finished run

mod jsonl;
mod schema;
mod sqlite_output;
pub mod stats;
mod traits;

pub use jsonl::JsonLinesSink;
pub use sqlite_output::SqliteSink;
pub use stats::{print_summary, RunSummary};
pub use traits::{OutputError, OutputResult, RecordSink};

use crate::config::{OutputConfig, OutputKind};
use std::path::Path;

/// Opens the sink described by an `[output]` section
///
/// # Arguments
///
/// * `config` - The output configuration
///
/// # Returns
///
/// * `Ok(Box<dyn RecordSink>)` - The sink is ready for writing
/// * `Err(OutputError)` - The output file could not be opened
pub fn open_sink(config: &OutputConfig) -> OutputResult<Box<dyn RecordSink>> {
    let path = Path::new(&config.path);
    let sink: Box<dyn RecordSink> = match config.kind {
        OutputKind::Jsonl => Box::new(JsonLinesSink::open(path)?),
        OutputKind::Sqlite => Box::new(SqliteSink::open(path)?),
    };
    Ok(sink)
}
