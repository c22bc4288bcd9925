//! Run statistics
//!
//! This module provides the per-stage summary returned by a finished run and
//! its console rendering.

use crate::state::{CounterSnapshot, Stage};
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Final counter values of one engine run
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    /// Name of the spider that ran
    pub spider: String,

    /// Request stage counters
    pub requests: CounterSnapshot,

    /// Response stage counters
    pub responses: CounterSnapshot,

    /// Item stage counters
    pub items: CounterSnapshot,

    /// When the run started
    pub started_at: DateTime<Utc>,

    /// Wall-clock duration of the run
    pub elapsed: Duration,
}

impl RunSummary {
    /// Returns the snapshot of the given stage
    pub fn stage(&self, stage: Stage) -> CounterSnapshot {
        match stage {
            Stage::Request => self.requests,
            Stage::Response => self.responses,
            Stage::Item => self.items,
        }
    }

    /// Returns true when no unit failed in any stage
    pub fn is_clean(&self) -> bool {
        self.requests.fail == 0 && self.responses.fail == 0 && self.items.fail == 0
    }
}

/// Prints a run summary to stdout in a formatted manner
///
/// # Arguments
///
/// * `summary` - The summary to display
pub fn print_summary(summary: &RunSummary) {
    println!("=== Crawl Statistics: {} ===\n", summary.spider);

    println!("Overview:");
    println!("  Started at: {}", summary.started_at.to_rfc3339());
    println!("  Elapsed: {:.1}s", summary.elapsed.as_secs_f64());
    println!();

    println!("Stages:");
    for stage in [Stage::Request, Stage::Response, Stage::Item] {
        let snapshot = summary.stage(stage);
        println!(
            "  {:<8} total: {:>6}  success: {:>6}  fail: {:>6}  ({:.1}% success)",
            stage.as_str(),
            snapshot.total,
            snapshot.success,
            snapshot.fail,
            snapshot.success_rate()
        );
    }
    println!();

    println!(
        "Records delivered: {} / {} items dispatched",
        summary.items.success, summary.items.total
    );
}
