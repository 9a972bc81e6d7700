//! Application layer - the conversation bridge.
//!
//! Orchestrates the upstream conversation API for one stateless chat call:
//! handle resolution, append, generation, and reply extraction or relay.

pub mod bridge;
pub mod relay;

pub use bridge::{
    BridgeError, BridgeSettings, ChatCommand, ChatReply, ChatStream, ConversationBridge,
};
pub use relay::{relay, OpenStream, RelayStream, SseFrame};
