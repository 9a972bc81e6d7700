//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the application and the outside world. Adapters implement these ports.
//!
//! - `ConversationApi` - Hosted conversation service that owns chat state

mod conversation_api;

pub use conversation_api::{ApiError, ByteStream, ConversationApi, GenerateOptions, Generation};
