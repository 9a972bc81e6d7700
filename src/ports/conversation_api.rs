//! Conversation API Port - Interface to the hosted conversation service.
//!
//! The upstream service owns conversation state. This port exposes the small
//! capability set the bridge needs, independent of which upstream protocol
//! variant backs it (threads + runs, conversations + responses, ...).
//!
//! # Design
//!
//! - Handles are opaque and minted by the upstream
//! - Buffered generation reports an optional status that may need polling
//! - Streaming generation returns the raw server-sent-event byte stream
//! - Errors carry the upstream HTTP status so callers can classify them
//!   without inspecting message text

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;

use crate::domain::conversation::{ConversationHandle, Message, MessageRole, RunState};

/// Raw upstream byte stream, relayed without buffering.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, ApiError>> + Send>>;

/// Port for the upstream conversation service.
#[async_trait]
pub trait ConversationApi: Send + Sync {
    /// Mints a new, empty conversation.
    async fn create_conversation(&self) -> Result<ConversationHandle, ApiError>;

    /// Checks that a conversation still exists upstream.
    ///
    /// Fails with a not-found [`ApiError`] when it has expired or never existed.
    async fn get_conversation(&self, handle: &ConversationHandle) -> Result<(), ApiError>;

    /// Appends a message to the conversation. Text is sent verbatim.
    async fn append_message(
        &self,
        handle: &ConversationHandle,
        role: MessageRole,
        text: &str,
    ) -> Result<(), ApiError>;

    /// Starts generating a reply without streaming.
    async fn generate_reply(
        &self,
        handle: &ConversationHandle,
        options: &GenerateOptions,
    ) -> Result<Generation, ApiError>;

    /// Re-reads the status of a generation started by [`generate_reply`].
    ///
    /// [`generate_reply`]: ConversationApi::generate_reply
    async fn get_generation(
        &self,
        handle: &ConversationHandle,
        generation_id: &str,
    ) -> Result<Generation, ApiError>;

    /// Starts generating a reply as a server-sent-event stream.
    ///
    /// Fails before returning if the upstream rejects the request.
    async fn open_reply_stream(
        &self,
        handle: &ConversationHandle,
        options: &GenerateOptions,
    ) -> Result<ByteStream, ApiError>;

    /// Lists the messages of a conversation in creation order.
    ///
    /// Implementations may return only the newest tail of a long
    /// conversation, as long as it reaches back to the latest assistant
    /// message.
    async fn list_messages(&self, handle: &ConversationHandle) -> Result<Vec<Message>, ApiError>;
}

/// Options for a reply generation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerateOptions {
    /// Model override; the adapter's configured default is used when absent.
    pub model: Option<String>,
}

impl GenerateOptions {
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

/// Result of starting or polling a generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generation {
    /// Upstream identifier used for polling.
    pub id: String,
    /// Reported status. `None` means the upstream does not track status and
    /// the generation is already complete.
    pub status: Option<RunState>,
}

impl Generation {
    pub fn new(id: impl Into<String>, status: Option<RunState>) -> Self {
        Self {
            id: id.into(),
            status,
        }
    }

    pub fn completed(id: impl Into<String>) -> Self {
        Self::new(id, Some(RunState::Completed))
    }

    /// True when no further polling is needed.
    pub fn is_done(&self) -> bool {
        self.status.as_ref().map_or(true, RunState::is_completed)
    }
}

/// Upstream conversation API errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ApiError {
    /// Credential or other required configuration is missing.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The upstream answered with a non-success status.
    #[error("upstream request failed ({status}): {payload}")]
    Upstream {
        /// HTTP status code.
        status: u16,
        /// Parsed JSON body, or the raw text wrapped in a JSON string.
        payload: serde_json::Value,
    },

    /// Network error during request.
    #[error("network error: {0}")]
    Network(String),

    /// Failed to parse upstream response.
    #[error("parse error: {0}")]
    Parse(String),
}

/// Upstream error codes that mean the conversation handle is unusable.
const INVALID_CONVERSATION_CODES: &[&str] = &[
    "conversation_not_found",
    "invalid_conversation",
    "thread_not_found",
    "not_found",
];

impl ApiError {
    pub fn upstream(status: u16, payload: serde_json::Value) -> Self {
        Self::Upstream { status, payload }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::Network(message.into())
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse(message.into())
    }

    /// Upstream HTTP status, if this error came from an upstream response.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Upstream { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns true if the conversation handle is missing or invalid upstream.
    ///
    /// A 404 always qualifies. A 400 qualifies when the structured error body
    /// names the conversation (`error.param == "conversation"`) or carries one
    /// of the known invalid-conversation codes.
    pub fn is_not_found(&self) -> bool {
        let ApiError::Upstream { status, payload } = self else {
            return false;
        };
        match *status {
            404 => true,
            400 => {
                let error = payload.get("error");
                let code = error.and_then(|e| e.get("code")).and_then(|c| c.as_str());
                let param = error.and_then(|e| e.get("param")).and_then(|p| p.as_str());
                param == Some("conversation")
                    || code.is_some_and(|c| INVALID_CONVERSATION_CODES.contains(&c))
            }
            _ => false,
        }
    }
}
