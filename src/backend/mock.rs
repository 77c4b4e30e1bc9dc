use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use crate::{
    backend::{BackendError, PredictionBackend},
    models::{BackendRequestItem, BackendResponseItem},
};

/// Test double for [`PredictionBackend`]. By default echoes each request's
/// payload back as its result; callers can install per-id overrides or a
/// blanket failure to drive the failure-mode scenarios.
#[derive(Clone, Default)]
pub struct MockBackend {
    inner: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    fail_batch: Option<String>,
    per_id_errors: std::collections::HashMap<Uuid, String>,
    omit_ids: std::collections::HashSet<Uuid>,
    batches_seen: Vec<Vec<Uuid>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every subsequent `predict_batch` call fails uniformly with
    /// `message`, as if the transport or the backend's HTTP status were
    /// broken.
    pub fn fail_all_batches(&self, message: impl Into<String>) {
        self.inner.lock().expect("mock lock").fail_batch = Some(message.into());
    }

    /// The named id's response carries an error instead of an echoed
    /// result, while the rest of its batch succeeds.
    pub fn fail_id(&self, id: Uuid, message: impl Into<String>) {
        self.inner
            .lock()
            .expect("mock lock")
            .per_id_errors
            .insert(id, message.into());
    }

    /// The named id is silently dropped from the backend's reply,
    /// simulating a routing miss.
    pub fn omit_id(&self, id: Uuid) {
        self.inner.lock().expect("mock lock").omit_ids.insert(id);
    }

    /// Correlation ids observed in each dispatched batch, in formation
    /// order, oldest batch first.
    pub fn batches_seen(&self) -> Vec<Vec<Uuid>> {
        self.inner.lock().expect("mock lock").batches_seen.clone()
    }
}

#[async_trait]
impl PredictionBackend for MockBackend {
    fn name(&self) -> &str {
        "mock-backend"
    }

    async fn predict_batch(
        &self,
        requests: Vec<BackendRequestItem>,
    ) -> Result<Vec<BackendResponseItem>, BackendError> {
        let mut state = self.inner.lock().expect("mock lock");
        state
            .batches_seen
            .push(requests.iter().map(|item| item.id).collect());

        if let Some(message) = state.fail_batch.clone() {
            return Err(BackendError::Transport(message));
        }

        let responses = requests
            .into_iter()
            .filter(|item| !state.omit_ids.contains(&item.id))
            .map(|item| {
                if let Some(message) = state.per_id_errors.get(&item.id) {
                    BackendResponseItem {
                        id: item.id,
                        result: None,
                        error: Some(message.clone()),
                    }
                } else {
                    BackendResponseItem {
                        id: item.id,
                        result: Some(echo(item.data)),
                        error: None,
                    }
                }
            })
            .collect();

        Ok(responses)
    }
}

fn echo(data: Value) -> Value {
    data
}
