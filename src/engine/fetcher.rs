//! HTTP fetcher implementation
//!
//! This module defines the transport seam of the engine and its default
//! implementation:
//! - The [`Fetch`] capability the request stage calls for every download
//! - Building HTTP clients with proper user agent strings and timeouts
//! - Translating a [`Request`] into an HTTP call and reading the whole body
//! - Error classification
//!
//! Any received HTTP status is returned as a [`Response`]; only transport
//! failures are errors, and those are what the engine retries.

use crate::config::{HttpConfig, UserAgentConfig};
use crate::model::{Request, Response};
use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Transport-level failures
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Request timeout for {url}")]
    Timeout { url: String },

    #[error("Connection failed for {url}: {message}")]
    Connect { url: String, message: String },

    #[error("HTTP error for {url}: {message}")]
    Http { url: String, message: String },

    #[error("Failed to read body from {url}: {message}")]
    Body { url: String, message: String },

    #[error("{0}")]
    Other(String),
}

/// The download capability used by the request stage
#[async_trait]
pub trait Fetch: Send + Sync {
    /// Performs one download attempt for `request`
    ///
    /// # Returns
    ///
    /// * `Ok(Response)` - A response was received, whatever its status
    /// * `Err(FetchError)` - The transport failed; the engine will retry
    async fn fetch(&self, request: Arc<Request>) -> Result<Response, FetchError>;
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `user_agent` - The user agent configuration
/// * `http` - Timeout settings
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
///
/// # Example
///
/// ```no_run
/// use feedcrawl::config::{HttpConfig, UserAgentConfig};
/// use feedcrawl::engine::build_http_client;
///
/// let config = UserAgentConfig {
///     crawler_name: "Feedcrawl".to_string(),
///     crawler_version: "1.0".to_string(),
///     contact_url: "https://example.com/about".to_string(),
///     contact_email: "admin@example.com".to_string(),
/// };
///
/// let client = build_http_client(&config, &HttpConfig::default()).unwrap();
/// ```
pub fn build_http_client(
    user_agent: &UserAgentConfig,
    http: &HttpConfig,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(user_agent.header_value())
        .timeout(Duration::from_secs(http.timeout_secs))
        .connect_timeout(Duration::from_secs(http.connect_timeout_secs))
        .gzip(true)
        .brotli(true)
        .build()
}

/// [`Fetch`] implementation backed by a reqwest client
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Wraps an existing client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Builds a fetcher from user agent and HTTP settings
    pub fn from_config(
        user_agent: &UserAgentConfig,
        http: &HttpConfig,
    ) -> Result<Self, reqwest::Error> {
        Ok(Self::new(build_http_client(user_agent, http)?))
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    async fn fetch(&self, request: Arc<Request>) -> Result<Response, FetchError> {
        let url = Url::parse(&request.url).map_err(|e| FetchError::InvalidUrl {
            url: request.url.clone(),
            reason: e.to_string(),
        })?;

        let mut builder = self.client.request(request.method.clone(), url);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        tracing::debug!("Sending {}", request);
        let response = builder
            .send()
            .await
            .map_err(|e| classify_error(&request.url, e))?;

        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let headers: Vec<(String, String)> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        // Read the whole body before handing the response on
        let body = response.bytes().await.map_err(|e| FetchError::Body {
            url: request.url.clone(),
            message: e.to_string(),
        })?;

        let mut fetched = Response::new(request, status)
            .with_url(final_url)
            .with_body(body.to_vec());
        fetched.headers = headers;
        Ok(fetched)
    }
}

/// Maps a reqwest error onto the transport error taxonomy
fn classify_error(url: &str, error: reqwest::Error) -> FetchError {
    if error.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
        }
    } else if error.is_connect() {
        FetchError::Connect {
            url: url.to_string(),
            message: error.to_string(),
        }
    } else if error.is_builder() {
        FetchError::InvalidUrl {
            url: url.to_string(),
            reason: error.to_string(),
        }
    } else {
        FetchError::Http {
            url: url.to_string(),
            message: error.to_string(),
        }
    }
}
