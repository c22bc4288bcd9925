//! Stage handlers and the state they share with the coordination loop
//!
//! Each handler runs one unit through filter -> transform -> act, then either
//! hands the result to the next stage or requeues the unit for a retry. The
//! order inside every handler is fixed: push onto a queue first, count the
//! outcome second. The termination check relies on it.

use crate::config::EngineConfig;
use crate::engine::fetcher::{Fetch, FetchError};
use crate::model::{Item, Request, Response};
use crate::spider::{CrawlContext, Spider};
use crate::state::{Counter, CounterError, CounterSnapshot, Stage, WorkQueue};
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Notify, Semaphore};

/// Queues, counters and collaborators of one engine
pub(crate) struct Pipeline<S: Spider> {
    pub(crate) spider: S,
    fetcher: Arc<dyn Fetch>,

    pub(crate) requests: Arc<WorkQueue<Request>>,
    pub(crate) responses: WorkQueue<Response>,
    pub(crate) items: WorkQueue<Item<S::Record>>,

    request_counter: Counter,
    response_counter: Counter,
    item_counter: Counter,

    /// Bounds concurrent fetches only
    limiter: Semaphore,
    max_retries: u32,

    /// Fired on every queue push and every finished unit
    pub(crate) wake: Arc<Notify>,

    /// First counter violation raised by a handler
    fatal: Mutex<Option<CounterError>>,

    /// Handler tasks created but not yet finished
    in_flight: AtomicUsize,

    context: CrawlContext,
}

impl<S: Spider> Pipeline<S> {
    pub(crate) fn new(spider: S, fetcher: Arc<dyn Fetch>, config: &EngineConfig) -> Self {
        let requests = Arc::new(WorkQueue::new());
        let wake = Arc::new(Notify::new());
        let context = CrawlContext::new(Arc::clone(&requests), Arc::clone(&wake));

        Self {
            spider,
            fetcher,
            requests,
            responses: WorkQueue::new(),
            items: WorkQueue::new(),
            request_counter: Counter::new(Stage::Request),
            response_counter: Counter::new(Stage::Response),
            item_counter: Counter::new(Stage::Item),
            limiter: Semaphore::new(config.fetch_concurrency),
            max_retries: config.max_retries,
            wake,
            fatal: Mutex::new(None),
            in_flight: AtomicUsize::new(0),
            context,
        }
    }

    pub(crate) fn counter(&self, stage: Stage) -> &Counter {
        match stage {
            Stage::Request => &self.request_counter,
            Stage::Response => &self.response_counter,
            Stage::Item => &self.item_counter,
        }
    }

    pub(crate) fn snapshot(&self, stage: Stage) -> CounterSnapshot {
        self.counter(stage).snapshot()
    }

    /// True once every counter is drained and every queue is empty
    pub(crate) fn is_finished(&self) -> bool {
        // Counters first: a handler pushes before it counts
        let drained = Stage::ALL.iter().all(|stage| self.counter(*stage).drained());
        drained && self.requests.is_empty() && self.responses.is_empty() && self.items.is_empty()
    }

    /// Clears every queue and zeroes every counter
    pub(crate) fn reset(&self) {
        self.requests.clear();
        self.responses.clear();
        self.items.clear();
        for stage in Stage::ALL {
            self.counter(stage).reset();
        }
        self.fatal_slot().take();
    }

    pub(crate) fn push_request(&self, request: Request) {
        self.requests.push(request);
        self.wake.notify_one();
    }

    fn push_response(&self, response: Response) {
        self.responses.push(response);
        self.wake.notify_one();
    }

    fn push_item(&self, item: Item<S::Record>) {
        self.items.push(item);
        self.wake.notify_one();
    }

    fn succeed(&self, stage: Stage) -> Result<(), CounterError> {
        self.counter(stage).add_success()?;
        self.wake.notify_one();
        Ok(())
    }

    fn fail(&self, stage: Stage) -> Result<(), CounterError> {
        self.counter(stage).add_fail()?;
        self.wake.notify_one();
        Ok(())
    }

    fn fatal_slot(&self) -> std::sync::MutexGuard<'_, Option<CounterError>> {
        self.fatal.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Keeps the first counter violation for the coordination loop
    fn abort(&self, error: CounterError) {
        tracing::error!("Aborting run: {}", error);
        let mut slot = self.fatal_slot();
        if slot.is_none() {
            *slot = Some(error);
        }
        drop(slot);
        self.wake.notify_one();
    }

    pub(crate) fn take_fatal(&self) -> Option<CounterError> {
        self.fatal_slot().take()
    }

    /// Number of handler tasks that have not finished yet
    pub(crate) fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Worker task for one request
    ///
    /// The task is tracked as in flight from the moment it is created.
    pub(crate) fn run_request(
        self: Arc<Self>,
        request: Request,
    ) -> impl Future<Output = ()> + Send + 'static {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        async move {
            let outcome = AssertUnwindSafe(self.process_request(request))
                .catch_unwind()
                .await;
            self.settle(Stage::Request, outcome);
        }
    }

    /// Worker task for one response
    pub(crate) fn run_response(
        self: Arc<Self>,
        response: Response,
    ) -> impl Future<Output = ()> + Send + 'static {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        async move {
            let outcome = AssertUnwindSafe(self.process_response(response))
                .catch_unwind()
                .await;
            self.settle(Stage::Response, outcome);
        }
    }

    /// Worker task for one item
    pub(crate) fn run_item(
        self: Arc<Self>,
        item: Item<S::Record>,
    ) -> impl Future<Output = ()> + Send + 'static {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        async move {
            let outcome = AssertUnwindSafe(self.process_item(item))
                .catch_unwind()
                .await;
            self.settle(Stage::Item, outcome);
        }
    }

    /// Books the end of a handler task
    ///
    /// A panicking handler never reached its own count, so it is counted as a
    /// failure here. Nothing is requeued for it.
    fn settle(
        &self,
        stage: Stage,
        outcome: std::thread::Result<Result<(), CounterError>>,
    ) {
        let counted = match outcome {
            Ok(counted) => counted,
            Err(panic) => {
                tracing::error!(
                    "{} handler panicked: {}",
                    stage,
                    panic_message(panic.as_ref())
                );
                self.fail(stage)
            }
        };

        if let Err(e) = counted {
            self.abort(e);
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.wake.notify_one();
    }

    /// Filters, rewrites and fetches one request
    ///
    /// Only transport failures are retried. The request that goes back on the
    /// queue is the one received here, not the middleware's rewrite of it.
    pub(crate) async fn process_request(&self, mut request: Request) -> Result<(), CounterError> {
        match self.spider.request_filter(&request).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!("Request {} filtered out", request);
                return self.succeed(Stage::Request);
            }
            Err(e) => {
                tracing::warn!("Request filter failed for {}: {:#}", request, e);
                return self.fail(Stage::Request);
            }
        }

        if request.retry_count() > self.max_retries {
            tracing::error!(
                "Dropping request {} after {} failed attempts",
                request,
                request.retry_count()
            );
            return self.fail(Stage::Request);
        }

        let prepared = match self.spider.request_middleware(request.clone()).await {
            Ok(prepared) => prepared,
            Err(e) => {
                tracing::warn!("Request middleware failed for {}: {:#}", request, e);
                return self.fail(Stage::Request);
            }
        };

        let attempt = request.retry_count() + 1;
        let outcome = match self.limiter.acquire().await {
            Ok(_permit) => {
                tracing::trace!("Fetching {} (attempt {})", prepared, attempt);
                self.fetcher.fetch(Arc::new(prepared)).await
            }
            Err(_) => Err(FetchError::Other("fetch limiter closed".to_string())),
        };

        match outcome {
            Ok(response) => {
                tracing::debug!(
                    "Fetched {} with status {} (attempt {})",
                    response.url,
                    response.status,
                    attempt
                );
                self.push_response(response);
                self.succeed(Stage::Request)
            }
            Err(e) => {
                tracing::warn!(
                    "Fetch failed for {} (attempt {}/{}): {}",
                    request,
                    attempt,
                    self.max_retries + 1,
                    e
                );
                request.increase_retry_count();
                self.push_request(request);
                self.fail(Stage::Request)
            }
        }
    }

    /// Filters, rewrites and parses one response
    ///
    /// Nothing in this stage is retried.
    pub(crate) async fn process_response(&self, response: Response) -> Result<(), CounterError> {
        match self.spider.response_filter(&response).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!("Response {} filtered out", response);
                return self.succeed(Stage::Response);
            }
            Err(e) => {
                tracing::warn!("Response filter failed for {}: {:#}", response, e);
                return self.fail(Stage::Response);
            }
        }

        let locator = response.to_string();
        let attempt = response.request().retry_count() + 1;
        let response = match self.spider.response_middleware(response).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(
                    "Response middleware failed for {} (attempt {}): {:#}",
                    locator,
                    attempt,
                    e
                );
                return self.fail(Stage::Response);
            }
        };

        let record = match self.spider.parse(&response, &self.context).await {
            Ok(record) => record,
            Err(e) => {
                tracing::error!("Failed to parse {}: {:#}", response, e);
                return self.fail(Stage::Response);
            }
        };

        match record {
            Some(record) => {
                tracing::trace!("Parsed a record from {}", response.url);
                self.push_item(Item::new(record, response.shared_request()));
            }
            None => tracing::debug!("No record from {}", response.url),
        }
        self.succeed(Stage::Response)
    }

    /// Delivers one item to the sink, requeueing it on failure
    pub(crate) async fn process_item(&self, mut item: Item<S::Record>) -> Result<(), CounterError> {
        if item.retry_count() > self.max_retries {
            tracing::error!(
                "Dropping item from {} after {} failed deliveries",
                item.source_request(),
                item.retry_count()
            );
            return self.fail(Stage::Item);
        }

        match self.spider.sink(item.payload()).await {
            Ok(()) => self.succeed(Stage::Item),
            Err(e) => {
                tracing::warn!(
                    "Sink failed for item from {} (attempt {}/{}): {:#}",
                    item.source_request(),
                    item.retry_count() + 1,
                    self.max_retries + 1,
                    e
                );
                item.increase_retry_count();
                self.push_item(item);
                self.fail(Stage::Item)
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic"
    }
}
