use std::time::{Duration, Instant};

use axum::{
    extract::State,
    http::{header::CONTENT_TYPE, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use uuid::Uuid;

use crate::{
    errors::AppError,
    models::{HealthResponse, PredictRequestBody, PredictResponseBody, ReadyResponse},
    state::AppState,
};

/// Deadline an ingress submission carries into the admission queue. Not
/// part of the wire contract; a future revision could accept this as a
/// request header, but nothing in the spec calls for that yet.
const SUBMIT_DEADLINE: Duration = Duration::from_secs(30);

pub async fn predict(
    State(state): State<AppState>,
    Json(request): Json<PredictRequestBody>,
) -> Response {
    let request_id = Uuid::new_v4();
    let started = Instant::now();
    let _inflight = state.metrics.inflight_guard();

    let response = match state
        .batcher
        .submit(request_id, request.data, SUBMIT_DEADLINE)
        .await
    {
        Ok(result) => Json(PredictResponseBody::success(request_id, result)).into_response(),
        Err(error) => AppError::from_submit_error(request_id, error).into_response(),
    };

    state.metrics.observe_http_request(
        "/predict",
        "POST",
        response.status().as_u16(),
        started.elapsed(),
    );

    response
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let snapshot = state.metrics.snapshot();
    Json(HealthResponse {
        status: "healthy",
        uptime: format!("{}s", state.uptime_seconds()),
        total_requests: snapshot.total_requests,
        total_batches: snapshot.total_batches,
        avg_batch_size: snapshot.avg_batch_size,
    })
}

pub async fn ready() -> Json<ReadyResponse> {
    Json(ReadyResponse { status: "ready" })
}

pub async fn metrics(State(state): State<AppState>) -> Response {
    match state.metrics.render() {
        Ok(body) => (
            StatusCode::OK,
            [(CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(error) => AppError::Internal {
            request_id: Uuid::nil(),
            message: format!("metrics render failed: {error}"),
        }
        .into_response(),
    }
}
