//! Spider extension point
//!
//! A spider supplies the site-specific parts of a crawl:
//! - Lifecycle hooks (`init`, `teardown`)
//! - Request and response filters and middlewares
//! - `parse`, turning a response into an optional record
//! - `sink`, delivering a record
//!
//! Every hook except `name`, `parse` and `sink` has a default, so a minimal
//! spider only says how to read a page and where the result goes.

mod configured;
mod extract;

pub use configured::{ConfiguredSpider, ScrapedRecord};
pub use extract::{
    compile_html_fields, compile_selector, extract_html, extract_json, resolve_link,
    split_field_expression, HtmlExtraction, HtmlField,
};

use crate::model::{Request, Response};
use crate::state::WorkQueue;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Notify;

/// Site-specific behaviour driven by the engine
///
/// Filters return `Ok(false)` to drop a unit on purpose (counted as a
/// success). Any `Err` drops the unit as a failure and is never retried;
/// only transport and sink failures are retried.
#[async_trait]
pub trait Spider: Send + Sync + 'static {
    /// The record type produced by `parse` and consumed by `sink`
    type Record: Send + Sync + 'static;

    /// Name used in logs
    fn name(&self) -> &str;

    /// Runs once at the start of every run, before seeding
    async fn init(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Runs once after the run terminated normally
    async fn teardown(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Decides whether a request is fetched at all
    async fn request_filter(&self, _request: &Request) -> anyhow::Result<bool> {
        Ok(true)
    }

    /// Rewrites a request right before it is fetched
    ///
    /// Receives a fresh copy on every attempt; rewrites are not carried into retries.
    async fn request_middleware(&self, request: Request) -> anyhow::Result<Request> {
        Ok(request)
    }

    /// Decides whether a response is parsed; the default accepts 2xx
    async fn response_filter(&self, response: &Response) -> anyhow::Result<bool> {
        Ok(response.is_success())
    }

    /// Rewrites a response before it is parsed
    async fn response_middleware(&self, response: Response) -> anyhow::Result<Response> {
        Ok(response)
    }

    /// Parses a response into at most one record
    ///
    /// New requests discovered on the page can be scheduled through `context`.
    async fn parse(
        &self,
        response: &Response,
        context: &CrawlContext,
    ) -> anyhow::Result<Option<Self::Record>>;

    /// Delivers a record; an error schedules a retry of the item
    async fn sink(&self, record: &Self::Record) -> anyhow::Result<()>;
}

/// Handle through which `parse` schedules additional requests
#[derive(Clone)]
pub struct CrawlContext {
    requests: Arc<WorkQueue<Request>>,
    wake: Arc<Notify>,
}

impl CrawlContext {
    pub(crate) fn new(requests: Arc<WorkQueue<Request>>, wake: Arc<Notify>) -> Self {
        Self { requests, wake }
    }

    /// A context backed by its own queue, for calling `parse` outside an engine
    pub fn detached() -> Self {
        Self::new(Arc::new(WorkQueue::new()), Arc::new(Notify::new()))
    }

    /// Schedules a request on the engine's request queue
    pub fn enqueue(&self, request: Request) {
        tracing::trace!("Enqueued {} from parse", request);
        self.requests.push(request);
        self.wake.notify_one();
    }

    /// Number of requests waiting in the request queue
    pub fn pending(&self) -> usize {
        self.requests.len()
    }

    /// Removes and returns every waiting request
    pub fn drain(&self) -> Vec<Request> {
        std::iter::from_fn(|| self.requests.pop()).collect()
    }
}
