//! Configuration module
//!
//! This module handles loading, parsing, and validating TOML crawl files, and
//! holds the runtime [`EngineConfig`] used to build an engine programmatically.
//!
//! # Example
//!
//! ```no_run
//! use feedcrawl::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("douyu.toml")).unwrap();
//! println!("Max retries: {}", config.engine.max_retries);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    Config, EngineConfig, EngineSection, ExtractMode, HttpConfig, OutputConfig, OutputKind,
    SpiderConfig, UserAgentConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
pub use validation::validate_engine_config;
