use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// `POST /predict` request body. The payload is opaque to the proxy; it is
/// carried through to the backend untouched.
#[derive(Debug, Clone, Deserialize)]
pub struct PredictRequestBody {
    pub data: Value,
}

/// `POST /predict` response body. Exactly one of `result`/`error` is
/// populated.
#[derive(Debug, Clone, Serialize)]
pub struct PredictResponseBody {
    pub request_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PredictResponseBody {
    pub fn success(request_id: Uuid, result: Value) -> Self {
        Self {
            request_id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(request_id: Uuid, message: impl Into<String>) -> Self {
        Self {
            request_id,
            result: None,
            error: Some(message.into()),
        }
    }
}

/// `GET /health` response body.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub uptime: String,
    pub total_requests: u64,
    pub total_batches: u64,
    pub avg_batch_size: f64,
}

/// `GET /ready` response body.
#[derive(Debug, Serialize)]
pub struct ReadyResponse {
    pub status: &'static str,
}

/// One `(id, data)` pair sent to the backend's batch endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct BackendRequestItem {
    pub id: Uuid,
    pub data: Value,
}

/// Backend wire request: `POST {MODEL_SERVER_URL}/predict/batch`.
#[derive(Debug, Serialize)]
pub struct BackendBatchRequest {
    pub requests: Vec<BackendRequestItem>,
}

/// One `(id, result-or-error)` tuple as the backend reports it. Exactly one
/// of `result`/`error` is expected; if both are absent the item is treated
/// as an empty successful result.
#[derive(Debug, Deserialize)]
pub struct BackendResponseItem {
    pub id: Uuid,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Backend wire response body.
#[derive(Debug, Deserialize)]
pub struct BackendBatchResponse {
    pub responses: Vec<BackendResponseItem>,
}
