//! HTTP adapter for the chat endpoint.

pub mod dto;
pub mod handlers;
pub mod routes;

pub use dto::{ChatRequest, ChatResponse, ErrorResponse};
pub use handlers::{sse_response, ChatApiError, ChatAppState};
pub use routes::{chat_router, chat_routes, health_routes};
