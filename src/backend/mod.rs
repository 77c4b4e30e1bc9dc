pub mod http;
pub mod mock;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{BackendRequestItem, BackendResponseItem};

/// The dispatcher's adapter boundary to the remote model server. There is
/// exactly one production implementation ([`http::HttpBackend`]); tests
/// substitute [`mock::MockBackend`]. Unlike a multi-backend router, this
/// trait carries no health-checking or failover — a single backend is the
/// only supported topology.
#[async_trait]
pub trait PredictionBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Execute one batch round-trip and return exactly the entries the
    /// backend reported. The dispatcher (not this trait) is responsible
    /// for mapping entries back to requests, synthesizing "response not
    /// found" for ids with no entry, and discarding unmatched extras.
    async fn predict_batch(
        &self,
        requests: Vec<BackendRequestItem>,
    ) -> Result<Vec<BackendResponseItem>, BackendError>;
}

/// Every failure mode between "batch closed" and "parsed reply available".
/// The dispatcher promotes any of these to an identical error response for
/// every request in the batch.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("failed to marshal batch request: {0}")]
    Marshal(String),
    #[error("backend transport error: {0}")]
    Transport(String),
    #[error("backend returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("failed to read backend response body: {0}")]
    ReadBody(String),
    #[error("failed to unmarshal backend response: {0}")]
    Unmarshal(String),
}
