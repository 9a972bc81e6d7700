//! Conversation domain types.
//!
//! The upstream service owns all conversation state. These types describe what
//! the bridge reads back from it: an opaque handle, the messages appended to a
//! conversation, and the status of an in-flight generation.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Longest client-supplied handle accepted.
const MAX_HANDLE_LEN: usize = 128;

/// Opaque identifier for a durable upstream conversation.
///
/// Issued by the upstream API and handed to the caller, who passes it back on
/// the next stateless request. The bridge never stores it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationHandle(String);

impl ConversationHandle {
    /// Wraps an upstream-issued identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Parses a client-supplied handle.
    ///
    /// The handle becomes a URL path segment upstream, so anything blank,
    /// overlong, or outside `[A-Za-z0-9_-]` is treated as absent and a new
    /// conversation is started instead.
    pub fn from_client(raw: Option<&str>) -> Option<Self> {
        raw.map(str::trim)
            .filter(|s| Self::is_well_formed(s))
            .map(|s| Self(s.to_string()))
    }

    fn is_well_formed(raw: &str) -> bool {
        !raw.is_empty()
            && raw.len() <= MAX_HANDLE_LEN
            && raw
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ConversationHandle {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Role of the message author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// Visitor input.
    User,
    /// Generated reply.
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }
}

/// One block of message content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentBlock {
    /// A text-bearing block.
    Text(String),
    /// Anything else the upstream emits (images, refusals, tool output).
    Other { kind: String },
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    /// Returns the text if this block carries any.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ContentBlock::Text(text) => Some(text),
            ContentBlock::Other { .. } => None,
        }
    }
}

/// A message as listed by the upstream conversation.
///
/// Messages are immutable once appended. `sequence` is the position in an
/// ascending listing and breaks ties when `created_at` is missing or equal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: Option<String>,
    pub role: MessageRole,
    pub content: Vec<ContentBlock>,
    /// Upstream creation timestamp (unix seconds), when reported.
    pub created_at: Option<i64>,
    pub sequence: usize,
}

impl Message {
    pub fn new(role: MessageRole, content: Vec<ContentBlock>, sequence: usize) -> Self {
        Self {
            id: None,
            role,
            content,
            created_at: None,
            sequence,
        }
    }

    pub fn with_created_at(mut self, created_at: i64) -> Self {
        self.created_at = Some(created_at);
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Concatenates every text block in order, trimming surrounding whitespace.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(ContentBlock::as_text)
            .collect::<String>()
            .trim()
            .to_string()
    }

    fn creation_key(&self) -> (i64, usize) {
        (self.created_at.unwrap_or(i64::MIN), self.sequence)
    }
}

/// Extracts the reply text from a conversation listing.
///
/// Picks the most recently created assistant message (not the last array
/// entry, since listing order is not guaranteed) and joins its text blocks.
/// Returns an empty string when there is no assistant message or it carries
/// no text.
pub fn extract_reply_text(messages: &[Message]) -> String {
    messages
        .iter()
        .filter(|m| m.role == MessageRole::Assistant)
        .max_by_key(|m| m.creation_key())
        .map(Message::text)
        .unwrap_or_default()
}

/// Status of an asynchronous generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunState {
    Queued,
    InProgress,
    Completed,
    Failed,
    Expired,
    Cancelled,
    /// Finished early, e.g. on an output token limit.
    Incomplete,
    Other(String),
}

impl RunState {
    /// Maps an upstream status string.
    pub fn parse(status: &str) -> Self {
        match status {
            "queued" => RunState::Queued,
            "in_progress" => RunState::InProgress,
            "completed" => RunState::Completed,
            "failed" => RunState::Failed,
            "expired" => RunState::Expired,
            "cancelled" | "canceled" => RunState::Cancelled,
            "incomplete" => RunState::Incomplete,
            other => RunState::Other(other.to_string()),
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, RunState::Completed)
    }

    /// Terminal states other than `Completed`; polling these again is pointless.
    pub fn is_terminal_failure(&self) -> bool {
        matches!(
            self,
            RunState::Failed | RunState::Expired | RunState::Cancelled | RunState::Incomplete
        )
    }

    pub fn as_str(&self) -> &str {
        match self {
            RunState::Queued => "queued",
            RunState::InProgress => "in_progress",
            RunState::Completed => "completed",
            RunState::Failed => "failed",
            RunState::Expired => "expired",
            RunState::Cancelled => "cancelled",
            RunState::Incomplete => "incomplete",
            RunState::Other(s) => s,
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assistant(blocks: &[&str], sequence: usize) -> Message {
        Message::new(
            MessageRole::Assistant,
            blocks.iter().map(|b| ContentBlock::text(*b)).collect(),
            sequence,
        )
    }

    #[test]
    fn handle_from_client_ignores_blank() {
        assert_eq!(ConversationHandle::from_client(None), None);
        assert_eq!(ConversationHandle::from_client(Some("   ")), None);
        assert_eq!(
            ConversationHandle::from_client(Some(" conv_1 ")),
            Some(ConversationHandle::new("conv_1"))
        );
    }

    #[test]
    fn handle_from_client_rejects_path_characters() {
        for raw in [
            "../files?x=",
            "conv_1/items",
            "conv_1#frag",
            "conv 1",
            "conv%2F1",
            "convé",
        ] {
            assert_eq!(ConversationHandle::from_client(Some(raw)), None, "{raw}");
        }
        assert_eq!(ConversationHandle::from_client(Some(&"a".repeat(129))), None);
        assert_eq!(
            ConversationHandle::from_client(Some("conv_68a1-B2")),
            Some(ConversationHandle::new("conv_68a1-B2"))
        );
    }

    #[test]
    fn handle_serializes_as_plain_string() {
        let json = serde_json::to_string(&ConversationHandle::new("c1")).unwrap();
        assert_eq!(json, "\"c1\"");
    }

    #[test]
    fn extract_returns_empty_without_assistant_message() {
        let messages = vec![Message::new(
            MessageRole::User,
            vec![ContentBlock::text("Hi")],
            0,
        )];
        assert_eq!(extract_reply_text(&messages), "");
        assert_eq!(extract_reply_text(&[]), "");
    }

    #[test]
    fn extract_concatenates_text_blocks_in_order() {
        let mut msg = assistant(&["  Hello, ", "world!  "], 1);
        msg.content.insert(
            1,
            ContentBlock::Other {
                kind: "refusal".to_string(),
            },
        );
        assert_eq!(extract_reply_text(&[msg]), "Hello, world!");
    }

    #[test]
    fn extract_uses_creation_order_not_array_position() {
        let newer = assistant(&["newer"], 0).with_created_at(200);
        let older = assistant(&["older"], 1).with_created_at(100);
        assert_eq!(extract_reply_text(&[newer, older]), "newer");
    }

    #[test]
    fn extract_falls_back_to_listing_sequence() {
        let first = assistant(&["first"], 3);
        let second = assistant(&["second"], 7);
        assert_eq!(extract_reply_text(&[second, first]), "second");
    }

    #[test]
    fn extract_is_empty_when_latest_assistant_has_no_text() {
        let old = assistant(&["old"], 0);
        let latest = Message::new(
            MessageRole::Assistant,
            vec![ContentBlock::Other {
                kind: "image".to_string(),
            }],
            1,
        );
        assert_eq!(extract_reply_text(&[old, latest]), "");
    }

    #[test]
    fn run_state_parses_known_statuses() {
        assert_eq!(RunState::parse("queued"), RunState::Queued);
        assert_eq!(RunState::parse("in_progress"), RunState::InProgress);
        assert_eq!(RunState::parse("completed"), RunState::Completed);
        assert_eq!(RunState::parse("canceled"), RunState::Cancelled);
        assert_eq!(RunState::parse("incomplete"), RunState::Incomplete);
        assert_eq!(
            RunState::parse("requires_action"),
            RunState::Other("requires_action".to_string())
        );
    }

    #[test]
    fn run_state_terminal_failure_classification() {
        assert!(RunState::Failed.is_terminal_failure());
        assert!(RunState::Expired.is_terminal_failure());
        assert!(RunState::Cancelled.is_terminal_failure());
        assert!(!RunState::Completed.is_terminal_failure());
        assert!(!RunState::Queued.is_terminal_failure());
        assert!(RunState::Incomplete.is_terminal_failure());
        assert!(!RunState::Other("requires_action".to_string()).is_terminal_failure());
    }
}
