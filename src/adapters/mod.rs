//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the bridge to external systems:
//! - `openai` - Upstream conversation API over HTTP
//! - `mock` - In-memory upstream for tests and local runs
//! - `http` - Inbound REST/SSE endpoint

pub mod http;
pub mod mock;
pub mod openai;

pub use mock::MockConversationApi;
pub use openai::{OpenAIConfig, OpenAIConversationApi};
