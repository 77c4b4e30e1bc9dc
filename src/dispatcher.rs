use std::{collections::HashMap, sync::Arc};

use tracing::warn;

use crate::{
    backend::PredictionBackend,
    models::BackendRequestItem,
    queue::{PendingRequest, Response, ROUTING_MISS_MESSAGE},
};

/// Serializes a closed batch to the backend's wire format, performs one
/// round-trip via the configured [`PredictionBackend`], and maps the
/// reply back to each request by correlation id. Invoked strictly
/// serially by the batcher — at most one batch in flight at a time.
pub struct Dispatcher {
    backend: Arc<dyn PredictionBackend>,
}

impl Dispatcher {
    pub fn new(backend: Arc<dyn PredictionBackend>) -> Self {
        Self { backend }
    }

    /// Produces exactly one [`Response`] per request in `batch`, in no
    /// particular order. Any dispatch-layer failure is promoted to an
    /// identical error for every request; a successful dispatch maps
    /// replies by id and synthesizes [`ROUTING_MISS_MESSAGE`] for any
    /// request the backend didn't answer.
    pub async fn dispatch(&self, batch: &[PendingRequest]) -> Vec<Response> {
        let items: Vec<BackendRequestItem> = batch
            .iter()
            .map(|request| BackendRequestItem {
                id: request.id,
                data: request.payload.clone(),
            })
            .collect();

        match self.backend.predict_batch(items).await {
            Ok(replies) => {
                let mut by_id: HashMap<_, _> = replies
                    .into_iter()
                    .map(|reply| {
                        let outcome = match reply.error {
                            Some(message) => Err(message),
                            None => Ok(reply.result.unwrap_or(serde_json::Value::Null)),
                        };
                        (reply.id, outcome)
                    })
                    .collect();

                batch
                    .iter()
                    .map(|request| {
                        let outcome = by_id
                            .remove(&request.id)
                            .unwrap_or_else(|| Err(ROUTING_MISS_MESSAGE.to_owned()));
                        Response {
                            id: request.id,
                            outcome,
                        }
                    })
                    .collect()
            }
            Err(error) => {
                warn!(
                    backend = self.backend.name(),
                    batch_size = batch.len(),
                    error = %error,
                    "batch dispatch failed; failing every request in the batch"
                );
                let message = error.to_string();
                batch
                    .iter()
                    .map(|request| Response::err(request.id, message.clone()))
                    .collect()
            }
        }
    }
}
