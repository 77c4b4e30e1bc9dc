pub mod backend;
pub mod batcher;
pub mod config;
pub mod dispatcher;
pub mod errors;
pub mod handlers;
pub mod metrics;
pub mod models;
pub mod queue;
pub mod state;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};

use config::Config;
use state::AppState;

pub fn build_state() -> Result<AppState, std::io::Error> {
    let config = Config::from_env();
    AppState::new(&config).map_err(std::io::Error::other)
}

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/predict", post(handlers::predict))
        .route("/health", get(handlers::health))
        .route("/ready", get(handlers::ready))
        .route("/metrics", get(handlers::metrics))
        .layer(CatchPanicLayer::custom(errors::recover_panic))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
