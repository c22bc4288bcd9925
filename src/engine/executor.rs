//! Work scheduler for stage handlers
//!
//! Stage handlers never run on the coordination loop's task. They are
//! submitted to a dedicated multi-thread tokio runtime that keeps running for
//! the lifetime of the engine, so a slow fetch can never stall queue
//! bookkeeping or the termination check.

use std::future::Future;
use tokio::runtime::{Builder, Runtime};

/// An always-running runtime that executes submitted tasks fire-and-forget
pub struct WorkScheduler {
    runtime: Option<Runtime>,
}

impl WorkScheduler {
    /// Starts the worker runtime
    ///
    /// # Arguments
    ///
    /// * `worker_threads` - Number of OS threads executing handlers
    ///
    /// # Returns
    ///
    /// * `Ok(WorkScheduler)` - The runtime is up
    /// * `Err(std::io::Error)` - The runtime could not be built
    pub fn start(worker_threads: usize) -> std::io::Result<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(worker_threads)
            .thread_name("feedcrawl-worker")
            .enable_all()
            .build()?;

        tracing::debug!("Worker runtime started with {} threads", worker_threads);
        Ok(Self {
            runtime: Some(runtime),
        })
    }

    /// Submits a task without waiting for it
    pub fn submit<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if let Some(runtime) = &self.runtime {
            // The join handle is dropped on purpose: completion is observed through the counters
            runtime.spawn(task);
        }
    }
}

impl Drop for WorkScheduler {
    fn drop(&mut self) {
        // Dropping a runtime blocks, which is not allowed from async code.
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}
