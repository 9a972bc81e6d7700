//! Mock Adapters.
//!
//! Configurable in-memory implementations for testing.

mod mock_conversation_api;

pub use mock_conversation_api::{ApiOperation, MockCall, MockChunk, MockConversationApi};
