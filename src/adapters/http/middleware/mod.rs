//! HTTP middleware for axum.
//!
//! - `cors` - Cross-origin policy for the chat widget

pub mod cors;

pub use cors::cors_layer;
