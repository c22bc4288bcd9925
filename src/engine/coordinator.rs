//! Engine coordination loop
//!
//! The coordinator runs on the caller's task. Each iteration it:
//! 1. Dispatches one response, if any is queued
//! 2. Dispatches one item, if any is queued
//! 3. Dispatches one request, if any is queued and the pacing gap has passed
//! 4. Checks for termination, or waits for a wake-up when nothing was dispatched
//!
//! All handler work runs on the [`WorkScheduler`]; the coordinator only moves
//! units from queues to workers and keeps the books.

use crate::config::{validate_engine_config, EngineConfig};
use crate::engine::executor::WorkScheduler;
use crate::engine::fetcher::Fetch;
use crate::engine::handlers::Pipeline;
use crate::engine::pacing::Pacer;
use crate::model::Request;
use crate::output::RunSummary;
use crate::spider::Spider;
use crate::state::{CounterError, CounterSnapshot, Stage};
use crate::{EngineError, Result};
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;

/// The three-stage crawl engine
pub struct Engine<S: Spider> {
    config: EngineConfig,
    pipeline: Arc<Pipeline<S>>,
    pacer: Pacer,
    workers: WorkScheduler,
}

impl<S: Spider> Engine<S> {
    /// Creates an engine and starts its worker runtime
    ///
    /// # Arguments
    ///
    /// * `spider` - Site-specific hooks
    /// * `fetcher` - Transport used by the request stage
    /// * `config` - Seeds, retry cap, pacing and concurrency settings
    ///
    /// # Returns
    ///
    /// * `Ok(Engine)` - Ready to run
    /// * `Err(EngineError)` - Invalid configuration or the worker runtime failed to start
    pub fn new(spider: S, fetcher: Arc<dyn Fetch>, config: EngineConfig) -> Result<Self> {
        validate_engine_config(&config)?;

        let workers = WorkScheduler::start(config.worker_threads).map_err(EngineError::Runtime)?;
        let pipeline = Arc::new(Pipeline::new(spider, fetcher, &config));
        let pacer = Pacer::new(config.pacing_interval);

        Ok(Self {
            config,
            pipeline,
            pacer,
            workers,
        })
    }

    /// Returns the spider driven by this engine
    pub fn spider(&self) -> &S {
        &self.pipeline.spider
    }

    /// Returns the engine configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Returns the current counter values of a stage
    pub fn snapshot(&self, stage: Stage) -> CounterSnapshot {
        self.pipeline.snapshot(stage)
    }

    /// Runs the spider over every seed until all work is done
    ///
    /// Calls `init`, seeds one request per seed, coordinates until every
    /// counter is drained and every queue is empty, then calls `teardown` and
    /// resets the counters. The engine can be run again afterwards.
    ///
    /// # Returns
    ///
    /// * `Ok(RunSummary)` - Final counter values of each stage
    /// * `Err(EngineError::Hook)` - `init` or `teardown` failed
    /// * `Err(EngineError::Counter)` - A counter invariant was violated; the run was aborted
    pub async fn run(&mut self) -> Result<RunSummary> {
        let name = self.pipeline.spider.name().to_string();
        let started_at = Utc::now();
        let started = Instant::now();

        self.pipeline.reset();
        self.pacer.reset();

        tracing::info!(
            "Starting spider {} with {} seeds",
            name,
            self.config.seeds.len()
        );

        self.pipeline
            .spider
            .init()
            .await
            .map_err(|source| EngineError::Hook {
                hook: "init",
                source,
            })?;

        for seed in &self.config.seeds {
            self.pipeline.push_request(Request::new(seed.clone()));
        }

        if let Err(e) = self.coordinate().await {
            tracing::error!("Spider {} aborted: {}", name, e);
            self.wait_for_workers().await;
            self.pipeline.reset();
            return Err(e.into());
        }

        let summary = RunSummary {
            spider: name,
            requests: self.pipeline.snapshot(Stage::Request),
            responses: self.pipeline.snapshot(Stage::Response),
            items: self.pipeline.snapshot(Stage::Item),
            started_at,
            elapsed: started.elapsed(),
        };

        for stage in [Stage::Request, Stage::Response, Stage::Item] {
            let snapshot = summary.stage(stage);
            tracing::info!(
                "{} stage: total={} success={} fail={}",
                stage,
                snapshot.total,
                snapshot.success,
                snapshot.fail
            );
        }
        tracing::info!(
            "Spider {} finished in {:.2}s",
            summary.spider,
            summary.elapsed.as_secs_f64()
        );

        let teardown = self.pipeline.spider.teardown().await;
        self.pipeline.reset();
        teardown.map_err(|source| EngineError::Hook {
            hook: "teardown",
            source,
        })?;

        Ok(summary)
    }

    /// Waits until every handler task submitted so far has finished
    ///
    /// Nothing new is dispatched here. Units those tasks push stay queued
    /// and are dropped by the following reset.
    async fn wait_for_workers(&self) {
        while self.pipeline.in_flight() > 0 {
            let wake = self.pipeline.wake.notified();
            let _ = tokio::time::timeout(self.config.idle_tick, wake).await;
        }
    }

    /// Moves work from the queues to the workers until the run is finished
    async fn coordinate(&mut self) -> std::result::Result<(), CounterError> {
        let pipeline = &self.pipeline;

        loop {
            if let Some(error) = pipeline.take_fatal() {
                return Err(error);
            }

            let mut dispatched = false;

            if let Some(response) = pipeline.responses.pop() {
                pipeline.counter(Stage::Response).add_total();
                let task = Arc::clone(pipeline);
                self.workers.submit(task.run_response(response));
                dispatched = true;
            }

            if let Some(item) = pipeline.items.pop() {
                pipeline.counter(Stage::Item).add_total();
                let task = Arc::clone(pipeline);
                self.workers.submit(task.run_item(item));
                dispatched = true;
            }

            let now = Instant::now();
            let pacing_wait = self.pacer.time_until_ready(now);
            if pacing_wait.is_none() {
                if let Some(request) = pipeline.requests.pop() {
                    pipeline.counter(Stage::Request).add_total();
                    let task = Arc::clone(pipeline);
                    self.workers.submit(task.run_request(request));
                    self.pacer.record_dispatch(now);
                    dispatched = true;
                }
            }

            if dispatched {
                tokio::task::yield_now().await;
                continue;
            }

            if pipeline.is_finished() {
                return Ok(());
            }

            let wait = match pacing_wait {
                Some(gap) => gap.min(self.config.idle_tick),
                None => self.config.idle_tick,
            };
            // Either a push, a finished unit or the timeout ends the wait
            let _ = tokio::time::timeout(wait, pipeline.wake.notified()).await;
        }
    }
}
