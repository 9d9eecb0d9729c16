//! HTTP server assembly: router construction and startup.
//!
//! The router layers the JSON API over a static fallback that serves the
//! embedded dashboard shell, with `index.html` as the catch-all for client
//! side routes. Dev mode binds on all interfaces and enables permissive
//! CORS so a separately served UI build can talk to the API.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{
    Router,
    body::Body,
    extract::{DefaultBodyLimit, Request},
    http::{StatusCode, header},
    response::{Html, IntoResponse, Response},
};
use tower_http::cors::CorsLayer;

use crate::api::{self, AppState};
use crate::config::MonitorConfig;
use crate::embedded::Assets;
use crate::poll;
use crate::registry::{RegistryHandle, SourceRegistry};

/// Build the full application router with API and static shell serving.
pub fn build_router(state: Arc<AppState>, max_upload_bytes: usize) -> Router {
    api::api_router()
        .fallback(static_handler)
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(state)
}

/// Serve embedded static files or fall back to index.html.
async fn static_handler(req: Request<Body>) -> impl IntoResponse {
    let path = req.uri().path().trim_start_matches('/');

    if !path.is_empty() {
        if let Some(content) = Assets::get(path) {
            let mime = mime_guess::from_path(path).first_or_octet_stream();
            return Response::builder()
                .header(header::CONTENT_TYPE, mime.as_ref())
                .body(Body::from(content.data.to_vec()))
                .unwrap()
                .into_response();
        }
    }

    match Assets::get("index.html") {
        Some(content) => Html(String::from_utf8_lossy(&content.data).to_string()).into_response(),
        None => (StatusCode::NOT_FOUND, "Dashboard shell not found.").into_response(),
    }
}

/// Start the dashboard server and block until shutdown.
pub async fn start_server(config: MonitorConfig) -> Result<()> {
    let registry = RegistryHandle::new(SourceRegistry::new(config.storage.data_dir.clone()));
    let status = poll::shared_status();

    if config.refresh.enabled {
        poll::spawn_poller(
            registry.clone(),
            status.clone(),
            Duration::from_secs(config.refresh.interval_secs.max(1)),
        );
    }

    let state = Arc::new(AppState { registry, status });
    let mut app = build_router(state, config.storage.max_upload_bytes);

    if config.server.dev_mode {
        app = app.layer(CorsLayer::permissive());
    }

    let addr = format!("{}:{}", config.bind_host(), config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    let local_addr = listener.local_addr()?;
    tracing::info!(addr = %local_addr, data_dir = %config.storage.data_dir.display(), "taskmon running");
    println!("taskmon running at http://{}", local_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    println!("Server shut down gracefully.");
    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    println!("\nShutting down...");
}
