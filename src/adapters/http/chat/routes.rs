//! Axum routes for the chat endpoint.

use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use tower_http::timeout::TimeoutLayer;

use super::handlers::{chat, health, ChatAppState};

/// Creates routes for the chat endpoint.
///
/// - POST /api/chat
/// - POST /.netlify/functions/chatgpt - path used by the deployed widget
pub fn chat_routes() -> Router<ChatAppState> {
    Router::new()
        .route("/api/chat", post(chat))
        .route("/.netlify/functions/chatgpt", post(chat))
}

/// Liveness route, bounded by the server request timeout.
///
/// The chat routes are left without a timeout layer because event streams
/// stay open for the length of a reply.
pub fn health_routes<S>(request_timeout: Duration) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new()
        .route("/health", get(health))
        .layer(TimeoutLayer::new(request_timeout))
}

/// Combined router with state applied.
pub fn chat_router(state: ChatAppState, request_timeout: Duration) -> Router {
    chat_routes()
        .merge(health_routes(request_timeout))
        .with_state(state)
}
