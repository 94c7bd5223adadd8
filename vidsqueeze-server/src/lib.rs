//! Cross-origin-isolated static hosting for the conversion front end.
//!
//! The embedded encoder engine runs in a worker that needs shared-memory
//! threading, which browsers only enable under cross-origin isolation.
//! Every response therefore carries `Cross-Origin-Opener-Policy:
//! same-origin` and `Cross-Origin-Embedder-Policy: require-corp`; without
//! them the engine load fails on the client.

use axum::Router;
use axum::extract::State;
use axum::http::header::{HeaderName, HeaderValue};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::services::ServeDir;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

/// Builds the application router: static files from the build directory,
/// an SPA fallback to `index.html`, and the isolation headers on every
/// response.
pub fn router(dist: PathBuf) -> Router {
    let fallback = get(spa_fallback).with_state(Arc::new(dist.clone()));
    Router::new()
        .fallback_service(ServeDir::new(dist).not_found_service(fallback))
        .layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static("cross-origin-opener-policy"),
            HeaderValue::from_static("same-origin"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static("cross-origin-embedder-policy"),
            HeaderValue::from_static("require-corp"),
        ))
        .layer(TraceLayer::new_for_http())
}

/// Serves `index.html` for client-side routes, or a plain 404 when the
/// front end has not been built yet.
async fn spa_fallback(State(dist): State<Arc<PathBuf>>) -> Response {
    match tokio::fs::read_to_string(dist.join("index.html")).await {
        Ok(body) => Html(body).into_response(),
        Err(_) => (
            StatusCode::NOT_FOUND,
            "Build output not found. The deployment may be incomplete.",
        )
            .into_response(),
    }
}
