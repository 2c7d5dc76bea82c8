//! devmesh-server - network front end for the devmesh chat core
//!
//! Binds an axum WebSocket endpoint to the dispatch core. Configuration is
//! environment-driven: SQLite persistence via `DEVMESH_DB`, multi-process
//! scale-out via `DEVMESH_REDIS` (Redis pub/sub backplane plus shared
//! presence), in-memory single-process mode otherwise.
//!
//! Routes:
//! - `GET /ws`: WebSocket upgrade carrying the chat event protocol
//! - `GET /ping`: liveness probe

use anyhow::{Context, Result};
use axum::{http::header::HeaderValue, http::Method, routing::get, Router};
use tokio::net::TcpListener;
use tokio::signal::{
    ctrl_c,
    unix::{signal, SignalKind},
};
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

pub mod config;
pub mod state;
pub mod ws;

use config::Config;
use state::AppState;
use ws::ws_handler;

pub async fn start_server() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let config = Config::load();
    info!("Initializing state...");
    let state = AppState::new(config).await?;

    let origin: HeaderValue = state
        .config
        .cors_origin
        .parse()
        .context("Invalid CORS origin")?;
    let cors = CorsLayer::new()
        .allow_methods([Method::GET])
        .allow_origin(origin)
        .allow_credentials(true);

    let app = Router::new()
        .route("/ws", get(ws_handler))
        .route("/ping", get(ping_handler))
        .layer(cors)
        .with_state(state.clone());

    let address = format!("0.0.0.0:{}", state.config.port);
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {address}"))?;
    info!("Server running on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutting down...");
    Ok(())
}

async fn ping_handler() -> &'static str {
    "Backend is alive"
}

async fn shutdown_signal() {
    let ctrl_c = async {
        ctrl_c().await.expect("Failed to install Ctrl+C handler");
        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        signal(SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
        info!("Received terminate signal, shutting down");
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
