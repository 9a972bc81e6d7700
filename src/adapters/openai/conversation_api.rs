//! OpenAI Conversations API - Implementation of ConversationApi.
//!
//! Conversation state lives in the Conversations API; replies are produced
//! through the Responses API bound to that conversation, so the generated
//! assistant message is appended upstream automatically.
//!
//! # Endpoints
//!
//! | Operation | Request |
//! |---|---|
//! | create | `POST /conversations` |
//! | get | `GET /conversations/{id}` |
//! | append | `POST /conversations/{id}/items` |
//! | generate | `POST /responses` (optionally `background: true`) |
//! | poll | `GET /responses/{id}` |
//! | stream | `POST /responses` with `stream: true` |
//! | list | `GET /conversations/{id}/items?order=desc` |

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::transport::{HttpTransport, OpenAIConfig, TransportRequest};
use crate::domain::conversation::{
    ContentBlock, ConversationHandle, Message, MessageRole, RunState,
};
use crate::ports::{ApiError, ByteStream, ConversationApi, GenerateOptions, Generation};

/// Items fetched per page when listing a conversation.
const PAGE_SIZE: u32 = 100;

/// Upper bound on pages followed when listing a conversation.
const MAX_PAGES: usize = 10;

/// OpenAI-backed conversation API.
pub struct OpenAIConversationApi {
    transport: HttpTransport,
}

impl OpenAIConversationApi {
    /// Creates the adapter from its configuration.
    pub fn new(config: OpenAIConfig) -> Result<Self, ApiError> {
        Ok(Self {
            transport: HttpTransport::new(config)?,
        })
    }

    /// Creates the adapter on top of an existing transport.
    pub fn with_transport(transport: HttpTransport) -> Self {
        Self { transport }
    }

    fn config(&self) -> &OpenAIConfig {
        self.transport.config()
    }

    fn response_request(
        &self,
        handle: &ConversationHandle,
        options: &GenerateOptions,
        stream: bool,
    ) -> ResponseRequest {
        let config = self.config();
        ResponseRequest {
            model: options.model.clone().unwrap_or_else(|| config.model.clone()),
            conversation: handle.as_str().to_string(),
            background: (!stream && config.background).then_some(true),
            stream: stream.then_some(true),
        }
    }

    async fn call_json<T: for<'de> Deserialize<'de>>(
        &self,
        request: TransportRequest,
    ) -> Result<T, ApiError> {
        let response = self.transport.call(request).await?;
        serde_json::from_value(response.payload.into_json())
            .map_err(|e| ApiError::parse(format!("Failed to parse response: {}", e)))
    }
}

#[async_trait]
impl ConversationApi for OpenAIConversationApi {
    async fn create_conversation(&self) -> Result<ConversationHandle, ApiError> {
        let created: ConversationObject = self
            .call_json(TransportRequest::post("/conversations", json!({})))
            .await?;
        Ok(ConversationHandle::new(created.id))
    }

    async fn get_conversation(&self, handle: &ConversationHandle) -> Result<(), ApiError> {
        self.transport
            .call(TransportRequest::get(format!("/conversations/{}", handle)))
            .await?;
        Ok(())
    }

    async fn append_message(
        &self,
        handle: &ConversationHandle,
        role: MessageRole,
        text: &str,
    ) -> Result<(), ApiError> {
        let block_type = match role {
            MessageRole::User => "input_text",
            MessageRole::Assistant => "output_text",
        };
        let body = json!({
            "items": [{
                "type": "message",
                "role": role.as_str(),
                "content": [{ "type": block_type, "text": text }],
            }]
        });

        self.transport
            .call(TransportRequest::post(
                format!("/conversations/{}/items", handle),
                body,
            ))
            .await?;
        Ok(())
    }

    async fn generate_reply(
        &self,
        handle: &ConversationHandle,
        options: &GenerateOptions,
    ) -> Result<Generation, ApiError> {
        let request = self.response_request(handle, options, false);
        let body = serde_json::to_value(&request)
            .map_err(|e| ApiError::parse(format!("Failed to encode request: {}", e)))?;

        let response: ResponseObject = self
            .call_json(TransportRequest::post("/responses", body))
            .await?;
        Ok(response.into_generation())
    }

    async fn get_generation(
        &self,
        _handle: &ConversationHandle,
        generation_id: &str,
    ) -> Result<Generation, ApiError> {
        let response: ResponseObject = self
            .call_json(TransportRequest::get(format!("/responses/{}", generation_id)))
            .await?;
        Ok(response.into_generation())
    }

    async fn open_reply_stream(
        &self,
        handle: &ConversationHandle,
        options: &GenerateOptions,
    ) -> Result<ByteStream, ApiError> {
        let request = self.response_request(handle, options, true);
        let body = serde_json::to_value(&request)
            .map_err(|e| ApiError::parse(format!("Failed to encode request: {}", e)))?;

        let stream = self
            .transport
            .call_stream(TransportRequest::post("/responses", body).with_accept("text/event-stream"))
            .await?;

        Ok(Box::pin(stream.map(|chunk| chunk.map_err(ApiError::from))))
    }

    /// Pages backwards from the newest item until a page holds an assistant
    /// message, then returns what was seen in creation order.
    async fn list_messages(&self, handle: &ConversationHandle) -> Result<Vec<Message>, ApiError> {
        let mut newest_first = Vec::new();
        let mut after: Option<String> = None;

        let mut complete = false;
        for _ in 0..MAX_PAGES {
            let mut path = format!(
                "/conversations/{}/items?limit={}&order=desc",
                handle, PAGE_SIZE
            );
            if let Some(ref cursor) = after {
                path.push_str("&after=");
                path.push_str(cursor);
            }

            let page: ItemList = self.call_json(TransportRequest::get(path)).await?;
            let reached_reply = page.data.iter().any(ConversationItem::is_assistant_message);
            newest_first.extend(page.data);

            match (reached_reply, page.has_more, page.last_id) {
                (false, true, Some(cursor)) => after = Some(cursor),
                _ => {
                    complete = true;
                    break;
                }
            }
        }

        if !complete {
            tracing::warn!(conversation = %handle, "no assistant message within listing budget");
        }

        Ok(newest_first
            .into_iter()
            .rev()
            .enumerate()
            .filter_map(|(sequence, item)| item.into_message(sequence))
            .collect())
    }
}

// ----- OpenAI API Types -----

#[derive(Debug, Serialize)]
struct ResponseRequest {
    model: String,
    conversation: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    background: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct ConversationObject {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ResponseObject {
    id: String,
    status: Option<String>,
}

impl ResponseObject {
    fn into_generation(self) -> Generation {
        Generation::new(self.id, self.status.as_deref().map(RunState::parse))
    }
}

#[derive(Debug, Deserialize)]
struct ItemList {
    #[serde(default)]
    data: Vec<ConversationItem>,
    #[serde(default)]
    has_more: bool,
    last_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ConversationItem {
    #[serde(rename = "type")]
    kind: String,
    id: Option<String>,
    role: Option<String>,
    #[serde(default)]
    content: ItemContent,
    created_at: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ItemContent {
    Blocks(Vec<ContentPart>),
    Text(String),
}

impl Default for ItemContent {
    fn default() -> Self {
        ItemContent::Blocks(Vec::new())
    }
}

#[derive(Debug, Deserialize)]
struct ContentPart {
    #[serde(rename = "type")]
    kind: String,
    text: Option<String>,
}

impl ConversationItem {
    fn is_assistant_message(&self) -> bool {
        self.kind == "message" && self.role.as_deref() == Some("assistant")
    }

    fn into_message(self, sequence: usize) -> Option<Message> {
        if self.kind != "message" {
            return None;
        }
        let role = match self.role.as_deref() {
            Some("user") => MessageRole::User,
            Some("assistant") => MessageRole::Assistant,
            _ => return None,
        };

        let content = match self.content {
            ItemContent::Text(text) => vec![ContentBlock::Text(text)],
            ItemContent::Blocks(parts) => parts.into_iter().map(ContentPart::into_block).collect(),
        };

        let mut message = Message::new(role, content, sequence);
        message.id = self.id;
        message.created_at = self.created_at;
        Some(message)
    }
}

impl ContentPart {
    fn into_block(self) -> ContentBlock {
        let text_bearing = matches!(self.kind.as_str(), "input_text" | "output_text" | "text");
        match self.text {
            Some(text) if text_bearing => ContentBlock::Text(text),
            _ => ContentBlock::Other { kind: self.kind },
        }
    }
}
