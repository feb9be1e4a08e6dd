//! Shelf Bridge
//!
//! Replicates reading activity and progress from a session tracker's SQLite
//! database into a library manager's MySQL database, matching books across
//! the two catalogs by content hash, title, author, and filename signals.

use anyhow::Context;
use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use serde_json::json;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod catalog;
mod checkpoint;
mod config;
mod error;
mod matching;
mod state;
mod store;
mod sync;

use config::Config;
use state::BridgeState;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_check(State(_state): State<BridgeState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn bridge_status(State(state): State<BridgeState>) -> Json<serde_json::Value> {
    Json(json!({
        "interval_secs": state.config().sync.interval_secs,
        "status": state.status().await,
    }))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shelf_bridge=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env();

    tracing::info!("Starting Shelf Bridge v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Tracker DB: {}", config.tracker.db_path);
    tracing::info!(
        "Library DB: {}:{}/{}",
        config.library.host,
        config.library.port,
        config.library.database
    );
    tracing::info!("Sync interval: {}s", config.sync.interval_secs);
    tracing::info!("Library user id: {}", config.sync.user_id);

    let state = BridgeState::new(config.clone());

    // Run the sync loop alongside the status server
    let cancel = CancellationToken::new();
    let sync_task = tokio::spawn(sync::run_sync_loop(
        config.clone(),
        state.clone(),
        cancel.clone(),
    ));

    // Build router
    let app = Router::new()
        .route("/health", get(health_check))
        .route("/status", get(bridge_status))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Start server with graceful shutdown
    let listener =
        tokio::net::TcpListener::bind((config.server.host.as_str(), config.server.port))
            .await
            .with_context(|| {
                format!(
                    "failed to bind {}:{}",
                    config.server.host, config.server.port
                )
            })?;
    tracing::info!(
        "Shelf Bridge listening on {}:{}",
        config.server.host,
        config.server.port
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("status server failed")?;

    // Stop the sync loop before reporting shutdown
    cancel.cancel();
    sync_task.await.context("sync loop panicked")?;

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown...");
        },
    }
}
