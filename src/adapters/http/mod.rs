//! HTTP adapters - REST API implementations.

pub mod chat;
pub mod middleware;

// Re-export key types for convenience
pub use chat::{chat_router, ChatAppState};
pub use middleware::cors_layer;
