use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Unbounded FIFO queue shared between the coordination loop and the handlers
///
/// The lock is only held for the duration of a single push or pop, never
/// across an await point.
#[derive(Debug)]
pub struct WorkQueue<T> {
    items: Mutex<VecDeque<T>>,
}

impl<T> WorkQueue<T> {
    /// Creates an empty queue
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
        }
    }

    /// Appends a unit to the back of the queue
    pub fn push(&self, item: T) {
        self.items().push_back(item);
    }

    /// Removes the unit at the front of the queue
    pub fn pop(&self) -> Option<T> {
        self.items().pop_front()
    }

    /// Returns the number of queued units
    pub fn len(&self) -> usize {
        self.items().len()
    }

    /// Returns whether the queue is empty
    pub fn is_empty(&self) -> bool {
        self.items().is_empty()
    }

    /// Drops every queued unit
    pub fn clear(&self) {
        self.items().clear();
    }

    fn items(&self) -> MutexGuard<'_, VecDeque<T>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> Default for WorkQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
