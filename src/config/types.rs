use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;

/// Main configuration structure for a configured crawl
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineSection,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    #[serde(default)]
    pub http: HttpConfig,
    pub spider: SpiderConfig,
    pub output: OutputConfig,
}

impl Config {
    /// Builds the runtime engine configuration from the `[engine]` and `[spider]` sections
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            seeds: self.spider.seeds.clone(),
            max_retries: self.engine.max_retries,
            pacing_interval: Duration::from_millis(self.engine.pacing_interval_ms),
            fetch_concurrency: self.engine.fetch_concurrency,
            worker_threads: self.engine.worker_threads,
            ..EngineConfig::default()
        }
    }
}

/// Engine tuning as written in the `[engine]` table
#[derive(Debug, Clone, Deserialize)]
pub struct EngineSection {
    /// Retries allowed per request (transport failures) and per item (sink failures)
    #[serde(rename = "max-retries", default = "default_max_retries")]
    pub max_retries: u32,

    /// Minimum gap between two request dispatches (milliseconds)
    #[serde(rename = "pacing-interval-ms", default)]
    pub pacing_interval_ms: u64,

    /// Maximum number of fetches in flight
    #[serde(rename = "fetch-concurrency", default = "default_fetch_concurrency")]
    pub fetch_concurrency: usize,

    /// Threads of the worker runtime executing stage handlers
    #[serde(rename = "worker-threads", default = "default_worker_threads")]
    pub worker_threads: usize,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            pacing_interval_ms: 0,
            fetch_concurrency: default_fetch_concurrency(),
            worker_threads: default_worker_threads(),
        }
    }
}

/// Runtime configuration of an [`Engine`](crate::engine::Engine)
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Seed locations, one request each, in order
    pub seeds: Vec<String>,

    /// Retries allowed before a request or item is dropped
    pub max_retries: u32,

    /// Minimum wall-clock gap between request dispatches
    pub pacing_interval: Duration,

    /// Maximum number of fetches in flight
    pub fetch_concurrency: usize,

    /// Threads of the worker runtime
    pub worker_threads: usize,

    /// Longest the coordination loop sleeps when there is nothing to dispatch
    pub idle_tick: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            seeds: Vec::new(),
            max_retries: default_max_retries(),
            pacing_interval: Duration::ZERO,
            fetch_concurrency: default_fetch_concurrency(),
            worker_threads: default_worker_threads(),
            idle_tick: Duration::from_millis(50),
        }
    }
}

impl EngineConfig {
    /// Creates a default configuration for the given seeds
    pub fn new<I, T>(seeds: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            seeds: seeds.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_pacing_interval(mut self, interval: Duration) -> Self {
        self.pacing_interval = interval;
        self
    }

    pub fn with_fetch_concurrency(mut self, limit: usize) -> Self {
        self.fetch_concurrency = limit;
        self
    }

    pub fn with_worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = threads;
        self
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

impl UserAgentConfig {
    /// Formats the User-Agent header value: `Name/Version (+ContactURL; ContactEmail)`
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }
}

/// HTTP transport settings
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    /// Whole-request timeout (seconds)
    #[serde(rename = "timeout-secs", default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Connection establishment timeout (seconds)
    #[serde(rename = "connect-timeout-secs", default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

/// How a configured spider extracts fields from a response
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractMode {
    /// Fields are CSS selectors, optionally suffixed with `@attribute`
    #[default]
    Html,

    /// Fields are JSON pointers into the response body
    Json,
}

/// Site description for the configured spider
#[derive(Debug, Clone, Deserialize)]
pub struct SpiderConfig {
    /// Spider name, used in logs and output rows
    pub name: String,

    /// Seed locations (URLs, or ids rewritten by `url-template`)
    pub seeds: Vec<String>,

    /// Template turning a seed into a URL; `{seed}` is replaced by the seed
    #[serde(rename = "url-template")]
    pub url_template: Option<String>,

    /// HTTP method for seed requests (default GET)
    pub method: Option<String>,

    /// Extra headers sent with every request; `{seed}` is expanded as well
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// Statuses accepted by the response filter (default: any 2xx)
    #[serde(rename = "accept-status", default)]
    pub accept_status: Vec<u16>,

    /// Field extraction mode
    #[serde(default)]
    pub mode: ExtractMode,

    /// Field name -> CSS selector (html) or JSON pointer (json)
    pub fields: BTreeMap<String, String>,

    /// CSS selector of links to follow (html mode only)
    pub follow: Option<String>,

    /// How many link hops away from a seed may be followed
    #[serde(rename = "max-follow-depth", default)]
    pub max_follow_depth: u32,
}

/// Where extracted records are written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputKind {
    /// One JSON object per line
    Jsonl,

    /// Rows in an SQLite `records` table
    Sqlite,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Output format
    pub kind: OutputKind,

    /// Path of the output file
    pub path: String,
}

fn default_max_retries() -> u32 {
    10
}

fn default_fetch_concurrency() -> usize {
    500
}

fn default_worker_threads() -> usize {
    4
}

fn default_timeout_secs() -> u64 {
    300
}

fn default_connect_timeout_secs() -> u64 {
    10
}
