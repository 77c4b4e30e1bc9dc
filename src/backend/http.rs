use std::time::Duration;

use async_trait::async_trait;

use crate::{
    backend::{BackendError, PredictionBackend},
    models::{BackendBatchRequest, BackendBatchResponse, BackendRequestItem, BackendResponseItem},
};

/// Per-call deadline for one batch round-trip. Derived from a background
/// context, independent of any individual caller's own deadline — a
/// caller's cancellation never aborts a batch already in flight.
const DISPATCH_DEADLINE: Duration = Duration::from_secs(30);

/// The production [`PredictionBackend`]: one HTTP POST per batch to the
/// remote model server's batch endpoint, over a pooled client.
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
}

impl HttpBackend {
    /// `max_idle_per_host` should be at least `maxBatchSize` so a burst of
    /// concurrently-dispatched batches (impossible today, since the
    /// batcher dispatches strictly serially, but still the right ceiling
    /// for the pool) never pays a fresh-connection penalty.
    pub fn new(base_url: impl Into<String>, max_idle_per_host: usize) -> Result<Self, String> {
        let client = reqwest::Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(max_idle_per_host.max(1))
            .build()
            .map_err(|error| format!("failed to build backend HTTP client: {error}"))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

#[async_trait]
impl PredictionBackend for HttpBackend {
    fn name(&self) -> &str {
        "http-backend"
    }

    async fn predict_batch(
        &self,
        requests: Vec<BackendRequestItem>,
    ) -> Result<Vec<BackendResponseItem>, BackendError> {
        let payload = BackendBatchRequest { requests };
        let body = serde_json::to_vec(&payload)
            .map_err(|error| BackendError::Marshal(error.to_string()))?;

        let response = self
            .client
            .post(self.url("/predict/batch"))
            .timeout(DISPATCH_DEADLINE)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|error| BackendError::Transport(error.to_string()))?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|error| BackendError::ReadBody(error.to_string()))?;

        if !status.is_success() {
            let body = String::from_utf8_lossy(&bytes).chars().take(400).collect();
            return Err(BackendError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: BackendBatchResponse =
            serde_json::from_slice(&bytes).map_err(|error| BackendError::Unmarshal(error.to_string()))?;

        Ok(parsed.responses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_joins_base_and_path_regardless_of_slashes() {
        let backend = HttpBackend::new("http://localhost:8000/", 8).expect("client builds");
        assert_eq!(backend.url("/predict/batch"), "http://localhost:8000/predict/batch");
        assert_eq!(backend.url("predict/batch"), "http://localhost:8000/predict/batch");
    }
}
