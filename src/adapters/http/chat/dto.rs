//! DTOs for the chat endpoint.

use serde::{Deserialize, Serialize};

use crate::application::ChatCommand;
use crate::domain::conversation::ConversationHandle;

// ════════════════════════════════════════════════════════════════════════════════
// Request DTOs
// ════════════════════════════════════════════════════════════════════════════════

/// Body of `POST /api/chat`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    /// Visitor text. Missing is treated like blank.
    #[serde(default)]
    pub prompt: Option<String>,

    /// Handle from a previous reply. Older widget builds send `threadId`.
    #[serde(default, alias = "threadId", alias = "conversationId")]
    pub conversation_handle: Option<String>,

    /// Relay the reply as server-sent events.
    #[serde(default)]
    pub stream: bool,

    /// Model override.
    #[serde(default)]
    pub model: Option<String>,
}

impl ChatRequest {
    pub fn into_command(self) -> ChatCommand {
        let supplied = self.conversation_handle.as_deref();
        let handle = ConversationHandle::from_client(supplied);
        if handle.is_none() && supplied.is_some_and(|raw| !raw.trim().is_empty()) {
            tracing::warn!("ignoring malformed conversation handle");
        }

        ChatCommand::new(self.prompt.unwrap_or_default())
            .with_handle(handle)
            .with_model(self.model)
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Response DTOs
// ════════════════════════════════════════════════════════════════════════════════

/// Buffered reply.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub reply: String,
    pub conversation_handle: String,
    /// Same value as `conversation_handle`, kept for older clients.
    pub thread_id: String,
}

impl ChatResponse {
    pub fn new(reply: String, handle: &ConversationHandle) -> Self {
        Self {
            reply,
            conversation_handle: handle.to_string(),
            thread_id: handle.to_string(),
        }
    }
}

/// Error body: `{"error": "..."}`, plus upstream status and payload when known.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            status: None,
            details: None,
        }
    }

    pub fn upstream(error: impl Into<String>, status: u16, details: serde_json::Value) -> Self {
        Self {
            error: error.into(),
            status: Some(status),
            details: Some(details),
        }
    }
}

/// Liveness probe body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: String,
}
