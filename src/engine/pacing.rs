//! Global inter-request pacing
//!
//! The request stage may only dispatch once the configured interval has
//! passed since its previous dispatch. The pacer only answers "how long until
//! the next dispatch is allowed"; it never sleeps itself, so the coordination
//! loop can keep servicing the other stages while it waits.

use std::time::{Duration, Instant};

/// Tracks the last request dispatch and enforces the minimum gap
#[derive(Debug, Clone)]
pub struct Pacer {
    /// Minimum gap between two dispatches
    interval: Duration,

    /// Instant of the previous dispatch in this run
    last_dispatch: Option<Instant>,
}

impl Pacer {
    /// Creates a pacer with the given minimum interval
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_dispatch: None,
        }
    }

    /// Returns the configured interval
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Calculates the time until the next dispatch is allowed
    ///
    /// Returns None if a request can be dispatched now, or the duration to wait otherwise.
    pub fn time_until_ready(&self, now: Instant) -> Option<Duration> {
        let last = self.last_dispatch?;
        let elapsed = now.saturating_duration_since(last);
        if elapsed < self.interval {
            Some(self.interval - elapsed)
        } else {
            None
        }
    }

    /// Records that a request was dispatched at `now`
    pub fn record_dispatch(&mut self, now: Instant) {
        self.last_dispatch = Some(now);
    }

    /// Forgets the previous dispatch so a new run starts unthrottled
    pub fn reset(&mut self) {
        self.last_dispatch = None;
    }
}
