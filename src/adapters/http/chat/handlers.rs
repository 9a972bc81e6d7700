//! HTTP handlers for the chat endpoint.
//!
//! These handlers connect Axum routes to the conversation bridge.

use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Json, State};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures::Stream;

use crate::application::{BridgeError, BridgeSettings, ConversationBridge};
use crate::ports::ConversationApi;

use super::dto::{ChatRequest, ChatResponse, ErrorResponse, HealthResponse};

// ════════════════════════════════════════════════════════════════════════════════
// Application State
// ════════════════════════════════════════════════════════════════════════════════

/// Shared application state for chat handlers.
#[derive(Clone)]
pub struct ChatAppState {
    pub bridge: Arc<ConversationBridge<dyn ConversationApi>>,
}

impl ChatAppState {
    /// Creates a new ChatAppState.
    pub fn new(api: Arc<dyn ConversationApi>, settings: BridgeSettings) -> Self {
        Self {
            bridge: Arc::new(ConversationBridge::new(api, settings)),
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// POST /api/chat
// ════════════════════════════════════════════════════════════════════════════════

/// POST /api/chat - Send one visitor message.
///
/// Buffered mode answers `{reply, conversationHandle, threadId}`. Streaming
/// mode (`"stream": true`) answers an event stream whose first frame is
/// `event: conversation`; failures to open or relay the upstream stream
/// arrive after it as `event: error`.
///
/// # Errors
/// - 400 Bad Request: malformed body, blank or oversized prompt
/// - 500 Internal Server Error: missing credential, upstream failure, or a
///   generation that did not complete
pub async fn chat(
    State(state): State<ChatAppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Response, ChatApiError> {
    let Json(request) = payload.map_err(|rejection| {
        ChatApiError::BadRequest(format!("invalid request body: {}", rejection.body_text()))
    })?;

    let stream = request.stream;
    let command = request.into_command();

    if stream {
        let reply = state.bridge.stream(command).await?;
        Ok(sse_response(reply.body))
    } else {
        let reply = state.bridge.reply(command).await?;
        Ok((StatusCode::OK, Json(ChatResponse::new(reply.reply, &reply.handle))).into_response())
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// GET /health
// ════════════════════════════════════════════════════════════════════════════════

/// GET /health - Liveness probe.
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

/// Wraps a relay stream in an event-stream response.
pub fn sse_response<S>(stream: S) -> Response
where
    S: Stream<Item = Result<Bytes, Infallible>> + Send + 'static,
{
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/event-stream; charset=utf-8"),
    );
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-cache, no-transform"),
    );
    headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    headers.insert(
        HeaderName::from_static("x-accel-buffering"),
        HeaderValue::from_static("no"),
    );
    (headers, Body::from_stream(stream)).into_response()
}

// ════════════════════════════════════════════════════════════════════════════════
// Error Handling
// ════════════════════════════════════════════════════════════════════════════════

/// API error type for chat endpoints.
#[derive(Debug)]
pub enum ChatApiError {
    BadRequest(String),
    Bridge(BridgeError),
}

impl From<BridgeError> for ChatApiError {
    fn from(err: BridgeError) -> Self {
        match err {
            BridgeError::InvalidInput(msg) => ChatApiError::BadRequest(msg),
            other => ChatApiError::Bridge(other),
        }
    }
}

impl IntoResponse for ChatApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ChatApiError::BadRequest(msg) => {
                tracing::warn!("Rejected chat request: {}", msg);
                (StatusCode::BAD_REQUEST, ErrorResponse::new(msg))
            }
            ChatApiError::Bridge(err) => {
                tracing::error!(error = %err, "Chat request failed");
                let body = match &err {
                    BridgeError::Upstream { status, payload } => {
                        ErrorResponse::upstream(err.to_string(), *status, payload.clone())
                    }
                    _ => ErrorResponse::new(err.to_string()),
                };
                (StatusCode::INTERNAL_SERVER_ERROR, body)
            }
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::conversation::RunState;
    use serde_json::json;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn invalid_input_maps_to_400() {
        let err: ChatApiError = BridgeError::InvalidInput("prompt must be a non-empty string".into()).into();
        let response = err.into_response();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await,
            json!({ "error": "prompt must be a non-empty string" })
        );
    }

    #[tokio::test]
    async fn upstream_error_carries_status_and_details() {
        let err: ChatApiError = BridgeError::Upstream {
            status: 429,
            payload: json!({ "error": { "message": "slow down" } }),
        }
        .into();
        let response = err.into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["status"], 429);
        assert_eq!(body["details"]["error"]["message"], "slow down");
    }

    #[tokio::test]
    async fn incomplete_generation_maps_to_500() {
        let err: ChatApiError = BridgeError::GenerationIncomplete {
            last_state: RunState::InProgress,
        }
        .into();
        let response = err.into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert!(body["error"].as_str().unwrap().contains("in_progress"));
        assert!(body.get("status").is_none());
    }

    #[test]
    fn sse_response_disables_buffering() {
        let response = sse_response(futures::stream::empty::<Result<Bytes, Infallible>>());

        let headers = response.headers();
        assert_eq!(headers[header::CONTENT_TYPE], "text/event-stream; charset=utf-8");
        assert_eq!(headers[header::CACHE_CONTROL], "no-cache, no-transform");
        assert_eq!(headers["x-accel-buffering"], "no");
    }
}
