use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;
use uuid::Uuid;

use crate::{
    models::PredictResponseBody,
    queue::{SubmitError, ROUTING_MISS_MESSAGE},
};

/// Errors the ingress layer can surface to a caller once a request has
/// been admitted, following the teacher's `errors.rs` shape (one variant
/// per failure cause, each carrying what it needs to render its own
/// envelope) minus the auth/rate-limit variants that don't apply here.
/// Malformed request bodies never reach this enum — axum's `Json`
/// extractor rejects those with its own 400 before a handler runs, since
/// there is no further semantic validation this proxy performs on an
/// already-parsed, opaque payload.
#[derive(Debug, Error)]
pub enum AppError {
    /// The caller's deadline elapsed, or it cancelled, before a reply was
    /// available (spec §7.1/§7.2).
    #[error("request cancelled or timed out before a reply was available")]
    Cancelled { request_id: Uuid },
    /// A dispatch-layer failure (marshal/transport/status/read/unmarshal)
    /// or a per-request backend error (spec §7.3/§7.4).
    #[error("{message}")]
    Backend { request_id: Uuid, message: String },
    /// The backend's reply carried no entry for this id (spec §7.5).
    #[error("{}", ROUTING_MISS_MESSAGE)]
    RoutingMiss { request_id: Uuid },
    /// A programming error recovered at the HTTP middleware boundary
    /// (spec §7.6), or anything else that doesn't fit the other variants.
    #[error("{message}")]
    Internal { request_id: Uuid, message: String },
}

impl AppError {
    pub fn from_submit_error(request_id: Uuid, error: SubmitError) -> Self {
        match error {
            SubmitError::Cancelled => AppError::Cancelled { request_id },
            SubmitError::Failed(message) if message == ROUTING_MISS_MESSAGE => {
                AppError::RoutingMiss { request_id }
            }
            SubmitError::Failed(message) => AppError::Backend { request_id, message },
        }
    }

    fn request_id(&self) -> Uuid {
        match self {
            AppError::Cancelled { request_id }
            | AppError::Backend { request_id, .. }
            | AppError::RoutingMiss { request_id }
            | AppError::Internal { request_id, .. } => *request_id,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Every variant here is reached only after a request was already
        // admitted into the pipeline; the spec reserves 400 for malformed
        // bodies (handled upstream by the `Json` extractor) and maps
        // every admitted-request failure mode to 500.
        let status = StatusCode::INTERNAL_SERVER_ERROR;
        let request_id = self.request_id();
        let message = self.to_string();
        (status, Json(PredictResponseBody::error(request_id, message))).into_response()
    }
}

/// Recovers a panic inside a handler at the HTTP middleware boundary
/// (installed via `tower_http::catch_panic::CatchPanicLayer`), logs it,
/// and returns the same 500 envelope shape — without affecting the
/// batcher, which runs on its own task independent of any one request.
pub fn recover_panic(panic: Box<dyn std::any::Any + Send + 'static>) -> Response {
    let message = panic
        .downcast_ref::<&str>()
        .map(|value| value.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "handler panicked".to_owned());

    tracing::error!(panic = %message, "recovered panic in HTTP handler");

    AppError::Internal {
        request_id: Uuid::nil(),
        message: "internal server error".to_owned(),
    }
    .into_response()
}
