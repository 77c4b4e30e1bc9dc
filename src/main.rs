mod backend;
mod batcher;
mod config;
mod dispatcher;
mod errors;
mod handlers;
mod metrics;
mod models;
mod queue;
mod state;

use std::net::SocketAddr;

use axum::{
    routing::{get, post},
    Router,
};
use tokio::signal;
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use config::Config;
use state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{},nexus_proxy=debug", config.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let state = AppState::new(&config).map_err(std::io::Error::other)?;
    info!(model_server = %config.model_server_url, batch_size = config.batch.max_batch_size, "batcher configured");

    let app = Router::new()
        .route("/predict", post(handlers::predict))
        .route("/health", get(handlers::health))
        .route("/ready", get(handlers::ready))
        .route("/metrics", get(handlers::metrics))
        .layer(CatchPanicLayer::custom(errors::recover_panic))
        .layer(TraceLayer::new_for_http())
        .with_state(state.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "proxy listening");

    let serving = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal());
    match tokio::time::timeout(DRAIN_TIMEOUT, serving).await {
        Ok(result) => result?,
        Err(_) => tracing::warn!("graceful drain exceeded {:?}, forcing shutdown", DRAIN_TIMEOUT),
    }

    state.shutdown().await;
    info!("proxy stopped");
    Ok(())
}

/// How long the HTTP listener waits for in-flight connections to finish
/// after a shutdown signal before the process exits anyway.
const DRAIN_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

/// Waits for SIGINT or SIGTERM, whichever arrives first, so the process
/// responds to both an interactive Ctrl-C and an orchestrator's stop
/// signal the same way.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("shutdown signal received, draining");
}
