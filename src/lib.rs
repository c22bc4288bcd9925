//! Feedcrawl: a three-stage crawl-and-process engine
//!
//! This crate turns seed locations into requests, fetches them, parses the
//! responses into records and hands those records to a sink. Each stage has
//! its own queue, its own completion counter and its own retry policy, and all
//! stage work runs on a dedicated worker runtime driven by a coordination loop.

pub mod config;
pub mod engine;
pub mod model;
pub mod output;
pub mod spider;
pub mod state;

use thiserror::Error;

/// Main error type for engine runs
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Counter invariant violated: {0}")]
    Counter(#[from] state::CounterError),

    #[error("Spider hook `{hook}` failed: {source}")]
    Hook {
        hook: &'static str,
        source: anyhow::Error,
    },

    #[error("Failed to start worker runtime: {0}")]
    Runtime(std::io::Error),

    #[error("Output error: {0}")]
    Output(#[from] output::OutputError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid selector: {0}")]
    InvalidSelector(String),
}

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::{Config, EngineConfig};
pub use engine::{Engine, Fetch, FetchError, HttpFetcher, RunSummary};
pub use model::{Item, Request, Response};
pub use spider::{CrawlContext, Spider};
pub use state::{Counter, CounterSnapshot};
