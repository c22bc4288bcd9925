//! Scripted fetchers and spiders shared by the integration tests

use async_trait::async_trait;
use feedcrawl::model::{Request, Response};
use feedcrawl::spider::{CrawlContext, Spider};
use feedcrawl::{Fetch, FetchError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// What a [`ScriptedFetch`] does with every request
#[derive(Debug, Clone)]
pub enum Script {
    /// Answer with the given status; the body echoes the URL
    Respond(u16),

    /// Fail every attempt with a transport error
    AlwaysFail,

    /// Fail every URL containing the marker, answer 200 otherwise
    FailMatching(&'static str),

    /// Sleep, then answer 200
    Slow(Duration),
}

/// A fetcher that follows a script and records what it saw
pub struct ScriptedFetch {
    script: Script,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    attempts: Mutex<HashMap<String, usize>>,
    fetched_at: Mutex<HashMap<String, Instant>>,
}

impl ScriptedFetch {
    pub fn new(script: Script) -> Arc<Self> {
        Arc::new(Self {
            script,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            attempts: Mutex::new(HashMap::new()),
            fetched_at: Mutex::new(HashMap::new()),
        })
    }

    /// Total number of fetch calls
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of fetches observed running at once
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Number of fetch calls for one URL
    pub fn attempts(&self, url: &str) -> usize {
        self.attempts.lock().unwrap().get(url).copied().unwrap_or(0)
    }

    /// When the first fetch of a URL started
    pub fn fetched_at(&self, url: &str) -> Option<Instant> {
        self.fetched_at.lock().unwrap().get(url).copied()
    }
}

#[async_trait]
impl Fetch for ScriptedFetch {
    async fn fetch(&self, request: Arc<Request>) -> Result<Response, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self
            .attempts
            .lock()
            .unwrap()
            .entry(request.url.clone())
            .or_insert(0) += 1;
        self.fetched_at
            .lock()
            .unwrap()
            .entry(request.url.clone())
            .or_insert_with(Instant::now);

        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);

        let outcome = match &self.script {
            Script::Respond(status) => Ok(*status),
            Script::AlwaysFail => Err(()),
            Script::FailMatching(marker) if request.url.contains(marker) => Err(()),
            Script::FailMatching(_) => Ok(200),
            Script::Slow(delay) => {
                tokio::time::sleep(*delay).await;
                Ok(200)
            }
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match outcome {
            Ok(status) => {
                let body = request.url.clone().into_bytes();
                Ok(Response::new(request, status).with_body(body))
            }
            Err(()) => Err(FetchError::Connect {
                url: request.url.clone(),
                message: "connection refused".to_string(),
            }),
        }
    }
}

/// A spider whose every hook can be scripted
#[derive(Default)]
pub struct RecordingSpider {
    /// Drop every request in the request filter
    pub reject_requests: bool,

    /// Fail every parse
    pub fail_parse: bool,

    /// Number of sink calls that fail before the sink recovers
    pub sink_failures: usize,

    /// Panic inside the sink instead of returning
    pub panic_in_sink: bool,

    /// Links scheduled from every seed page (seeds have no metadata)
    pub follow_ups: Vec<String>,

    /// Retry counts of every request the filter saw
    pub filter_retry_counts: Mutex<Vec<u32>>,

    /// Records that reached the sink successfully
    pub delivered: Mutex<Vec<String>>,

    /// When each delivered record reached the sink
    pub delivered_at: Mutex<HashMap<String, Instant>>,

    pub sink_calls: AtomicUsize,
}

impl RecordingSpider {
    pub fn delivered(&self) -> Vec<String> {
        let mut delivered = self.delivered.lock().unwrap().clone();
        delivered.sort();
        delivered
    }

    pub fn sink_calls(&self) -> usize {
        self.sink_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Spider for RecordingSpider {
    type Record = String;

    fn name(&self) -> &str {
        "recording"
    }

    async fn request_filter(&self, request: &Request) -> anyhow::Result<bool> {
        self.filter_retry_counts
            .lock()
            .unwrap()
            .push(request.retry_count());
        Ok(!self.reject_requests)
    }

    async fn parse(
        &self,
        response: &Response,
        context: &CrawlContext,
    ) -> anyhow::Result<Option<String>> {
        if self.fail_parse {
            anyhow::bail!("unexpected page layout");
        }

        if response.request().metadata.is_null() {
            for link in &self.follow_ups {
                let url = format!("{}/{}", response.request().url, link);
                context.enqueue(Request::new(url).with_metadata(serde_json::json!({ "depth": 1 })));
            }
        }

        Ok(Some(response.text().into_owned()))
    }

    async fn sink(&self, record: &String) -> anyhow::Result<()> {
        let call = self.sink_calls.fetch_add(1, Ordering::SeqCst);
        if self.panic_in_sink {
            panic!("malformed record {}", record);
        }
        if call < self.sink_failures {
            anyhow::bail!("sink unavailable");
        }
        self.delivered_at
            .lock()
            .unwrap()
            .insert(record.clone(), Instant::now());
        self.delivered.lock().unwrap().push(record.clone());
        Ok(())
    }
}
