use crate::model::Request;
use std::sync::Arc;

/// A parsed record on its way to the sink
#[derive(Debug, Clone)]
pub struct Item<R> {
    payload: R,
    source: Arc<Request>,
    retry_count: u32,
}

impl<R> Item<R> {
    /// Wraps a record produced from the given request
    pub fn new(payload: R, source: Arc<Request>) -> Self {
        Self {
            payload,
            source,
            retry_count: 0,
        }
    }

    pub fn payload(&self) -> &R {
        &self.payload
    }

    pub fn into_payload(self) -> R {
        self.payload
    }

    /// The request whose response produced this record
    pub fn source_request(&self) -> &Request {
        &self.source
    }

    /// Number of failed sink deliveries so far
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Records one more failed sink delivery
    pub fn increase_retry_count(&mut self) {
        self.retry_count += 1;
    }
}
