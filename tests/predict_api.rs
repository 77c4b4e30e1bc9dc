use std::{sync::Arc, time::Duration};

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
};
use nexus_proxy::{backend::mock::MockBackend, batcher::BatchConfig, build_app, config::Config, state::AppState};
use serde_json::{json, Value};
use tower::util::ServiceExt;

fn test_config(max_batch_size: usize, timeout: Duration) -> Config {
    Config {
        port: 0,
        batch: BatchConfig {
            max_batch_size,
            timeout,
        },
        model_server_url: "http://unused.invalid".to_owned(),
        log_level: "info".to_owned(),
    }
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), 1024 * 1024)
        .await
        .expect("body readable");
    serde_json::from_slice(&bytes).expect("body is JSON")
}

#[tokio::test]
async fn predict_echoes_the_payload_on_success() {
    let backend = MockBackend::new();
    let config = test_config(8, Duration::from_millis(20));
    let state = AppState::new_for_tests(&config, Arc::new(backend));
    let app = build_app(state);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/predict")
                .header("content-type", "application/json")
                .body(Body::from(json!({"data": {"x": 1}}).to_string()))
                .expect("request build"),
        )
        .await
        .expect("request execution");

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert!(body.get("request_id").is_some());
    assert_eq!(body["result"], json!({"x": 1}));
    assert!(body.get("error").is_none());
}

#[tokio::test]
async fn predict_returns_500_when_the_backend_fails() {
    let backend = MockBackend::new();
    backend.fail_all_batches("model server unreachable");
    let config = test_config(8, Duration::from_millis(20));
    let state = AppState::new_for_tests(&config, Arc::new(backend));
    let app = build_app(state);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/predict")
                .header("content-type", "application/json")
                .body(Body::from(json!({"data": 1}).to_string()))
                .expect("request build"),
        )
        .await
        .expect("request execution");

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(response).await;
    assert!(body["error"]
        .as_str()
        .expect("error is a string")
        .contains("model server unreachable"));
    assert!(body.get("result").is_none());
}

#[tokio::test]
async fn predict_rejects_a_malformed_body() {
    let backend = MockBackend::new();
    let config = test_config(8, Duration::from_millis(20));
    let state = AppState::new_for_tests(&config, Arc::new(backend));
    let app = build_app(state);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/predict")
                .header("content-type", "application/json")
                .body(Body::from("not json"))
                .expect("request build"),
        )
        .await
        .expect("request execution");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn concurrent_requests_within_the_timeout_share_one_batch() {
    let backend = MockBackend::new();
    let config = test_config(8, Duration::from_millis(50));
    let state = AppState::new_for_tests(&config, Arc::new(backend));
    let app = build_app(state);

    let mut handles = Vec::new();
    for i in 0..4 {
        let app = app.clone();
        handles.push(tokio::spawn(async move {
            app.oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/predict")
                    .header("content-type", "application/json")
                    .body(Body::from(json!({"data": i}).to_string()))
                    .expect("request build"),
            )
            .await
            .expect("request execution")
        }));
    }

    for handle in handles {
        let response = handle.await.expect("task join");
        assert_eq!(response.status(), StatusCode::OK);
    }
}

#[tokio::test]
async fn health_reports_batch_counters_after_traffic() {
    let backend = MockBackend::new();
    let config = test_config(8, Duration::from_millis(20));
    let state = AppState::new_for_tests(&config, Arc::new(backend));
    let app = build_app(state);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/predict")
                .header("content-type", "application/json")
                .body(Body::from(json!({"data": 1}).to_string()))
                .expect("request build"),
        )
        .await
        .expect("request execution");
    assert_eq!(response.status(), StatusCode::OK);

    let health = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/health")
                .body(Body::empty())
                .expect("request build"),
        )
        .await
        .expect("request execution");
    assert_eq!(health.status(), StatusCode::OK);
    let body = body_json(health).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["total_requests"], 1);
    assert_eq!(body["total_batches"], 1);
}

#[tokio::test]
async fn ready_reports_200_immediately() {
    let backend = MockBackend::new();
    let config = test_config(8, Duration::from_millis(20));
    let state = AppState::new_for_tests(&config, Arc::new(backend));
    let app = build_app(state);

    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/ready")
                .body(Body::empty())
                .expect("request build"),
        )
        .await
        .expect("request execution");

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ready");
}

#[tokio::test]
async fn metrics_exposes_the_documented_series_names() {
    let backend = MockBackend::new();
    let config = test_config(8, Duration::from_millis(20));
    let state = AppState::new_for_tests(&config, Arc::new(backend));
    let app = build_app(state);

    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/metrics")
                .body(Body::empty())
                .expect("request build"),
        )
        .await
        .expect("request execution");

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), 1024 * 1024)
        .await
        .expect("body readable");
    let text = String::from_utf8(bytes.to_vec()).expect("metrics body is UTF-8");
    assert!(text.contains("nexus_proxy_requests_total"));
    assert!(text.contains("nexus_proxy_batches_total"));
    assert!(text.contains("nexus_proxy_batch_size_avg"));
}
