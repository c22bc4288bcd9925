//! Crawl engine
//!
//! This module contains the core pipeline:
//! - `coordinator`: The [`Engine`] and its coordination loop
//! - `handlers`: Request, response and item stage handlers
//! - `executor`: The worker runtime handlers run on
//! - `fetcher`: The [`Fetch`] transport seam and its reqwest implementation
//! - `pacing`: The inter-request delay of the request stage

mod coordinator;
mod executor;
mod fetcher;
mod handlers;
mod pacing;

pub use coordinator::Engine;
pub use executor::WorkScheduler;
pub use fetcher::{build_http_client, Fetch, FetchError, HttpFetcher};
pub use pacing::Pacer;

pub use crate::output::RunSummary;
