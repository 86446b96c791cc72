//! HTTP health surface for uptime monitors

use axum::{routing::get, Router};
use std::net::SocketAddr;
use tower_http::trace::TraceLayer;

/// Create the health router
pub fn create_router() -> Router {
    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
}

async fn health() -> &'static str {
    "OK"
}

/// Serve the health router until the process exits
pub async fn serve(port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "Health server listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, create_router()).await
}
