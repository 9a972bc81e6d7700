//! OpenAI Adapters.
//!
//! - `HttpTransport` - Authenticated JSON / event-stream client
//! - `OpenAIConversationApi` - Conversations + Responses protocol on top of it

mod conversation_api;
mod transport;

pub use conversation_api::OpenAIConversationApi;
pub use transport::{
    HttpTransport, OpenAIConfig, Payload, TransportError, TransportRequest, TransportResponse,
    TransportStream,
};
