//! State module for tracking pipeline progress
//!
//! This module provides the shared bookkeeping used by the coordination loop
//! and the stage handlers.
//!
//! # Components
//!
//! - `Stage`: Identifies one of the three pipeline stages
//! - `Counter`: Tracks dispatched/succeeded/failed units for one stage
//! - `WorkQueue`: Thread-safe FIFO queue feeding one stage

mod counter;
mod queue;

// Re-export main types
pub use counter::{Counter, CounterError, CounterSnapshot, Stage};
pub use queue::WorkQueue;
