use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{Router, response::Html, routing::get};
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use super::api::{self, AppState};
use super::ws;
use crate::config::AppConfig;

/// Single-page dashboard; talks to the JSON API and `/ws`.
const INDEX_HTML: &str = include_str!("index.html");

/// Build the full application router with the dashboard page, API and
/// WebSocket routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    let ws_tx = state.ws_tx.clone();

    api::api_router()
        .route("/", get(index))
        .route(
            "/ws",
            get(move |ws_upgrade| ws::ws_handler_with_sender(ws_upgrade, ws_tx)),
        )
        .with_state(state)
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// Start the dashboard server and block until Ctrl-C.
pub async fn start_server(config: AppConfig) -> Result<()> {
    let host = config.server.host.clone();
    let port = config.server.port;
    let dev_mode = config.server.dev_mode;

    let state = Arc::new(AppState::from_config(config));
    if !state.credentials.is_configured() {
        warn!("No Devin API key configured; requests need the x-devin-api-key header until one is set");
    }

    let mut app = build_router(state.clone());
    if dev_mode {
        app = app.layer(CorsLayer::permissive());
    }

    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    let local_addr = listener.local_addr()?;
    info!(addr = %local_addr, "dashboard listening");
    println!("issue-pilot dashboard running at http://{}", local_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    state.tracker.cancel_all();
    println!("Server shut down gracefully.");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    println!("\nShutting down...");
}
