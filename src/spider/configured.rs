//! Spider driven entirely by a `[spider]` configuration section
//!
//! Seeds are rewritten through an optional URL template, responses are
//! accepted by status, fields are extracted with CSS selectors or JSON
//! pointers, and links matched by the `follow` selector are scheduled up to
//! `max-follow-depth` hops away from their seed.

use crate::config::{Config, ExtractMode, SpiderConfig};
use crate::model::{Method, Request, Response};
use crate::output::{open_sink, RecordSink};
use crate::spider::extract::{compile_html_fields, compile_selector, extract_html, extract_json};
use crate::spider::{CrawlContext, HtmlField, Spider};
use crate::{ConfigError, EngineError};
use async_trait::async_trait;
use scraper::Selector;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use url::Url;

/// Placeholder replaced by the seed in templates and header values
const SEED_PLACEHOLDER: &str = "{seed}";

/// One extracted record
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScrapedRecord {
    /// Final URL of the page the record came from
    pub source_url: String,

    /// Extracted fields, keyed by field name
    pub fields: Map<String, Value>,
}

enum Extractor {
    Html {
        fields: Vec<HtmlField>,
        follow: Option<Selector>,
    },
    Json {
        fields: BTreeMap<String, String>,
    },
}

/// A [`Spider`] built from configuration
pub struct ConfiguredSpider {
    config: SpiderConfig,
    method: Method,
    extractor: Extractor,
    sink: Box<dyn RecordSink>,
    followed: Mutex<HashSet<String>>,
}

impl ConfiguredSpider {
    /// Builds a spider from its section and an already opened sink
    ///
    /// # Arguments
    ///
    /// * `config` - The `[spider]` section
    /// * `sink` - Where records are delivered
    ///
    /// # Returns
    ///
    /// * `Ok(ConfiguredSpider)` - Selectors compiled and method parsed
    /// * `Err(ConfigError)` - A selector or the method is invalid
    pub fn new(config: SpiderConfig, sink: Box<dyn RecordSink>) -> Result<Self, ConfigError> {
        let method = parse_method(config.method.as_deref())?;

        let extractor = match config.mode {
            ExtractMode::Html => Extractor::Html {
                fields: compile_html_fields(&config.fields)?,
                follow: config.follow.as_deref().map(compile_selector).transpose()?,
            },
            ExtractMode::Json => Extractor::Json {
                fields: config.fields.clone(),
            },
        };

        Ok(Self {
            config,
            method,
            extractor,
            sink,
            followed: Mutex::new(HashSet::new()),
        })
    }

    /// Builds a spider and opens the sink described by a full configuration
    pub fn from_config(config: &Config) -> Result<Self, EngineError> {
        let sink = open_sink(&config.output)?;
        Ok(Self::new(config.spider.clone(), sink)?)
    }

    /// Returns the spider section this spider was built from
    pub fn config(&self) -> &SpiderConfig {
        &self.config
    }

    /// Number of records the sink has accepted
    pub fn records_written(&self) -> u64 {
        self.sink.written()
    }

    /// Applies the URL template, method and headers to a request
    pub fn prepare(&self, request: Request) -> Request {
        prepare_request(&self.config, &self.method, request)
    }

    /// The seed requests a spider section produces, as they will be fetched
    pub fn seed_requests(config: &SpiderConfig) -> Result<Vec<Request>, ConfigError> {
        let method = parse_method(config.method.as_deref())?;
        Ok(config
            .seeds
            .iter()
            .map(|seed| prepare_request(config, &method, Request::new(seed.clone())))
            .collect())
    }

    fn followed(&self) -> MutexGuard<'_, HashSet<String>> {
        self.followed.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn schedule_links(&self, links: Vec<String>, response: &Response, context: &CrawlContext) {
        let depth = follow_depth(response.request());
        if depth >= self.config.max_follow_depth {
            return;
        }

        let seed = origin_seed(response.request());
        let mut followed = self.followed();
        // The page itself counts as visited so links back to it are skipped
        followed.insert(response.url.clone());
        followed.insert(response.request().url.clone());
        for link in links {
            if !followed.insert(link.clone()) {
                continue;
            }
            context.enqueue(
                Request::new(link).with_metadata(json!({ "seed": seed, "depth": depth + 1 })),
            );
        }
    }
}

fn parse_method(method: Option<&str>) -> Result<Method, ConfigError> {
    match method {
        Some(method) => Method::from_bytes(method.to_uppercase().as_bytes())
            .map_err(|_| ConfigError::Validation(format!("invalid method '{}'", method))),
        None => Ok(Method::GET),
    }
}

/// Seed requests (no follow depth in their metadata) have their locator
/// expanded through `url-template`; followed links are already URLs.
fn prepare_request(config: &SpiderConfig, method: &Method, mut request: Request) -> Request {
    let depth = follow_depth(&request);
    let seed = origin_seed(&request);

    if depth == 0 {
        if let Some(template) = &config.url_template {
            request.url = template.replace(SEED_PLACEHOLDER, &seed);
        }
        request.method = method.clone();
    }

    for (name, value) in &config.headers {
        if request.header(name).is_none() {
            request
                .headers
                .push((name.clone(), value.replace(SEED_PLACEHOLDER, &seed)));
        }
    }

    request
}

/// Hops from the seed recorded in a request's metadata (0 for seeds)
fn follow_depth(request: &Request) -> u32 {
    request
        .metadata
        .get("depth")
        .and_then(Value::as_u64)
        .map(|depth| depth as u32)
        .unwrap_or(0)
}

/// The seed a request descends from; a seed request is its own origin
fn origin_seed(request: &Request) -> String {
    request
        .metadata
        .get("seed")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| request.url.clone())
}

#[async_trait]
impl Spider for ConfiguredSpider {
    type Record = ScrapedRecord;

    fn name(&self) -> &str {
        &self.config.name
    }

    async fn init(&self) -> anyhow::Result<()> {
        self.followed().clear();
        Ok(())
    }

    async fn teardown(&self) -> anyhow::Result<()> {
        self.sink.flush()?;
        tracing::info!(
            "Spider {} wrote {} records",
            self.config.name,
            self.sink.written()
        );
        Ok(())
    }

    async fn request_middleware(&self, request: Request) -> anyhow::Result<Request> {
        Ok(self.prepare(request))
    }

    async fn response_filter(&self, response: &Response) -> anyhow::Result<bool> {
        if self.config.accept_status.is_empty() {
            Ok(response.is_success())
        } else {
            Ok(self.config.accept_status.contains(&response.status))
        }
    }

    async fn parse(
        &self,
        response: &Response,
        context: &CrawlContext,
    ) -> anyhow::Result<Option<ScrapedRecord>> {
        let fields = match &self.extractor {
            Extractor::Html { fields, follow } => {
                let base_url = Url::parse(&response.url).ok();
                let extraction = extract_html(
                    &response.text(),
                    base_url.as_ref(),
                    fields,
                    follow.as_ref(),
                );
                self.schedule_links(extraction.links, response, context);
                extraction.fields
            }
            Extractor::Json { fields } => {
                let document: Value = response.json()?;
                extract_json(&document, fields)
            }
        };

        if fields.is_empty() {
            tracing::debug!("No fields matched on {}", response.url);
            return Ok(None);
        }

        Ok(Some(ScrapedRecord {
            source_url: response.url.clone(),
            fields,
        }))
    }

    async fn sink(&self, record: &ScrapedRecord) -> anyhow::Result<()> {
        self.sink.write(&self.config.name, record)?;
        Ok(())
    }
}
