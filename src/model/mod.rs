//! Units of work flowing through the pipeline
//!
//! - `Request`: what to fetch, plus its retry counter and opaque metadata
//! - `Response`: what the transport returned for one request
//! - `Item`: a parsed record on its way to the sink

mod item;
mod request;
mod response;

pub use item::Item;
pub use request::Request;
pub use response::Response;

pub use reqwest::Method;
