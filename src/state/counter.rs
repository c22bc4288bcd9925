//! Per-stage completion counters
//!
//! A counter records how many units were dispatched to a stage and how many of
//! those have finished, successfully or not. A stage is drained when every
//! dispatched unit has finished.

use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;

/// One of the three pipeline stages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Requests waiting to be filtered, rewritten and fetched
    Request,

    /// Fetched responses waiting to be filtered and parsed
    Response,

    /// Parsed records waiting to be delivered to the sink
    Item,
}

impl Stage {
    /// All stages in coordination-loop poll order
    pub const ALL: [Stage; 3] = [Stage::Response, Stage::Item, Stage::Request];

    /// Returns the lowercase stage name used in logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Request => "request",
            Self::Response => "response",
            Self::Item => "item",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised when the counter invariant would be broken
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CounterError {
    #[error("{stage} counter over capacity (total={total}, success={success}, fail={fail})")]
    OverCapacity {
        stage: Stage,
        total: u64,
        success: u64,
        fail: u64,
    },
}

/// Point-in-time copy of a counter's values
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    /// Units dispatched to the stage
    pub total: u64,

    /// Units that finished successfully (including deliberate filtering)
    pub success: u64,

    /// Units that finished with a failure
    pub fail: u64,
}

impl CounterSnapshot {
    /// Number of dispatched units that have finished
    pub fn finished(&self) -> u64 {
        self.success + self.fail
    }

    /// Number of dispatched units still running
    pub fn in_flight(&self) -> u64 {
        self.total - self.finished()
    }

    /// Returns true when every dispatched unit has finished
    pub fn drained(&self) -> bool {
        self.finished() == self.total
    }

    /// Returns the success rate as a percentage of finished units
    pub fn success_rate(&self) -> f64 {
        let finished = self.finished();
        if finished == 0 {
            return 0.0;
        }
        (self.success as f64 / finished as f64) * 100.0
    }
}

/// Thread-safe counter for one stage
///
/// Invariant: `success + fail <= total` at all times.
#[derive(Debug)]
pub struct Counter {
    stage: Stage,
    counts: Mutex<CounterSnapshot>,
}

impl Counter {
    /// Creates a zeroed counter for the given stage
    pub fn new(stage: Stage) -> Self {
        Self {
            stage,
            counts: Mutex::new(CounterSnapshot::default()),
        }
    }

    /// Returns the stage this counter belongs to
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Records one more dispatched unit
    pub fn add_total(&self) {
        self.counts().total += 1;
    }

    /// Records a successfully finished unit
    ///
    /// # Returns
    ///
    /// * `Ok(())` - The success was recorded
    /// * `Err(CounterError::OverCapacity)` - Every dispatched unit had already finished
    pub fn add_success(&self) -> Result<(), CounterError> {
        let mut counts = self.counts();
        self.check_capacity(&counts)?;
        counts.success += 1;
        Ok(())
    }

    /// Records a failed unit
    ///
    /// # Returns
    ///
    /// * `Ok(())` - The failure was recorded
    /// * `Err(CounterError::OverCapacity)` - Every dispatched unit had already finished
    pub fn add_fail(&self) -> Result<(), CounterError> {
        let mut counts = self.counts();
        self.check_capacity(&counts)?;
        counts.fail += 1;
        Ok(())
    }

    /// Returns true when every dispatched unit has finished
    pub fn drained(&self) -> bool {
        self.counts().drained()
    }

    /// Returns a copy of the current values
    pub fn snapshot(&self) -> CounterSnapshot {
        *self.counts()
    }

    /// Zeroes all values
    pub fn reset(&self) {
        *self.counts() = CounterSnapshot::default();
    }

    fn check_capacity(&self, counts: &CounterSnapshot) -> Result<(), CounterError> {
        if counts.drained() {
            return Err(CounterError::OverCapacity {
                stage: self.stage,
                total: counts.total,
                success: counts.success,
                fail: counts.fail,
            });
        }
        Ok(())
    }

    // The guarded value is plain integers, so a panic elsewhere cannot leave it torn.
    fn counts(&self) -> MutexGuard<'_, CounterSnapshot> {
        self.counts.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
