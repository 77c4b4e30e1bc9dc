use std::{sync::Arc, time::Instant};

use crate::{
    backend::{http::HttpBackend, PredictionBackend},
    batcher::Batcher,
    config::Config,
    dispatcher::Dispatcher,
    metrics::AppMetrics,
};

/// Everything a handler needs: the batcher it submits into, the shared
/// metrics registry, and the clock it reports uptime from. Cheap to
/// clone — every field is already `Arc`-backed.
#[derive(Clone)]
pub struct AppState {
    pub batcher: Arc<Batcher>,
    pub metrics: Arc<AppMetrics>,
    started_at: Arc<Instant>,
}

impl AppState {
    pub fn new(config: &Config) -> Result<Self, String> {
        let backend = HttpBackend::new(&config.model_server_url, config.batch.max_batch_size)?;
        Ok(Self::with_backend(config, Arc::new(backend)))
    }

    /// Swaps in a test double in place of [`HttpBackend`]; used by the
    /// integration tests to drive the whole HTTP surface without a real
    /// model server.
    pub fn new_for_tests(config: &Config, backend: Arc<dyn PredictionBackend>) -> Self {
        Self::with_backend(config, backend)
    }

    fn with_backend(config: &Config, backend: Arc<dyn PredictionBackend>) -> Self {
        let metrics = Arc::new(AppMetrics::new());
        let dispatcher = Dispatcher::new(backend);
        let batcher = Arc::new(Batcher::new(config.batch, dispatcher, metrics.clone()));

        Self {
            batcher,
            metrics,
            started_at: Arc::new(Instant::now()),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    /// Drains the batcher and waits for its worker to terminate, as the
    /// final step of process shutdown.
    pub async fn shutdown(&self) {
        self.batcher.shutdown().await;
    }
}
