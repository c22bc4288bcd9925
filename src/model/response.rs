use crate::model::Request;
use serde::de::DeserializeOwned;
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

/// The transport's result for one request
///
/// Any HTTP status is a valid response; only transport failures are errors.
/// The originating request is shared, not owned, and is only used for
/// correlation.
#[derive(Debug, Clone)]
pub struct Response {
    /// HTTP status code
    pub status: u16,

    /// Final URL after redirects
    pub url: String,

    /// Response headers, in received order
    pub headers: Vec<(String, String)>,

    /// Fully read response body
    pub body: Vec<u8>,

    request: Arc<Request>,
}

impl Response {
    /// Creates an empty response for the given request
    pub fn new(request: Arc<Request>, status: u16) -> Self {
        Self {
            status,
            url: request.url.clone(),
            headers: Vec::new(),
            body: Vec::new(),
            request,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// The request that produced this response
    pub fn request(&self) -> &Request {
        &self.request
    }

    pub(crate) fn shared_request(&self) -> Arc<Request> {
        Arc::clone(&self.request)
    }

    /// Returns true for statuses in [200, 300)
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Returns the value of the first header with the given name (case-insensitive)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    /// Body decoded as UTF-8, replacing invalid sequences
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    /// Body deserialized as JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.request, self.status)
    }
}
