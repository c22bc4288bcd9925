use reqwest::Method;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::time::Duration;

/// An outbound fetch descriptor
///
/// The `url` is an opaque locator until it reaches the transport: seeds may be
/// bare identifiers that a request middleware rewrites into real URLs.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    /// Locator to fetch
    pub url: String,

    /// HTTP method
    pub method: Method,

    /// Extra request headers, in insertion order
    pub headers: Vec<(String, String)>,

    /// Query parameters appended to the URL
    pub query: Vec<(String, String)>,

    /// Request body
    pub body: Option<Vec<u8>>,

    /// Per-request timeout, overriding the transport default
    pub timeout: Option<Duration>,

    /// Opaque data carried through the pipeline unchanged
    pub metadata: Value,

    retry_count: u32,
}

impl Request {
    /// Creates a GET request for the given locator
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: Method::GET,
            headers: Vec::new(),
            query: Vec::new(),
            body: None,
            timeout: None,
            metadata: Value::Null,
            retry_count: 0,
        }
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Serializes `value` as the JSON body and sets the content type
    pub fn with_json<T: Serialize + ?Sized>(self, value: &T) -> Result<Self, serde_json::Error> {
        let body = serde_json::to_vec(value)?;
        Ok(self
            .with_header("content-type", "application/json")
            .with_body(body))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// Number of failed download attempts so far
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Records one more failed download attempt
    pub fn increase_retry_count(&mut self) {
        self.retry_count += 1;
    }

    /// Returns the value of the first header with the given name (case-insensitive)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}
