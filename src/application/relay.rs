//! Server-sent-event relay.
//!
//! Forwards the upstream event stream to the caller byte-for-byte, preceded
//! by a synthesized `conversation` frame announcing the resolved handle. The
//! upstream stream is opened only after that frame is out, so the caller
//! always learns the handle. A failure to open, or a failure mid-stream, is
//! reported in-band as an `error` frame and ends the stream; the HTTP status
//! has already been sent by then.

use bytes::Bytes;
use futures::future::BoxFuture;
use futures::{Stream, StreamExt};
use serde_json::{json, Value};
use std::convert::Infallible;
use std::pin::Pin;

use super::bridge::BridgeError;
use crate::domain::conversation::ConversationHandle;
use crate::ports::{ApiError, ByteStream};

/// Pending upstream stream, opened lazily by the relay.
pub type OpenStream = BoxFuture<'static, Result<ByteStream, ApiError>>;

/// Body stream handed to the HTTP layer. Never yields an error item.
pub type RelayStream = Pin<Box<dyn Stream<Item = Result<Bytes, Infallible>> + Send>>;

/// One `event:` + `data:` frame.
#[derive(Debug, Clone, PartialEq)]
pub struct SseFrame {
    pub event: String,
    pub data: Value,
}

impl SseFrame {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }

    /// Header frame carrying the resolved conversation handle.
    ///
    /// The handle is repeated under the legacy `threadId` and
    /// `conversationId` keys read by older widget builds.
    pub fn conversation(handle: &ConversationHandle) -> Self {
        Self::new(
            "conversation",
            json!({
                "conversationHandle": handle.as_str(),
                "threadId": handle.as_str(),
                "conversationId": handle.as_str(),
            }),
        )
    }

    /// Error frame. Upstream failures also carry `status` and `details`,
    /// mirroring the JSON error body of buffered mode.
    pub fn error(err: &BridgeError) -> Self {
        let mut data = json!({ "message": err.to_string() });
        if let BridgeError::Upstream { status, payload } = err {
            data["status"] = json!(status);
            data["details"] = payload.clone();
        }
        Self::new("error", data)
    }

    /// Encodes as `event: <name>\ndata: <json>\n\n`.
    pub fn encode(&self) -> Bytes {
        Bytes::from(format!("event: {}\ndata: {}\n\n", self.event, self.data))
    }
}

/// Logs when the caller goes away before the upstream stream ends.
struct RelayGuard {
    handle: ConversationHandle,
    bytes: usize,
    finished: bool,
}

impl Drop for RelayGuard {
    fn drop(&mut self) {
        if self.finished {
            tracing::debug!(conversation = %self.handle, bytes = self.bytes, "relay finished");
        } else {
            tracing::debug!(
                conversation = %self.handle,
                bytes = self.bytes,
                "caller disconnected; upstream stream released"
            );
        }
    }
}

/// Builds the outbound stream: header frame first, then every upstream chunk.
///
/// Dropping the returned stream (caller disconnect) drops the upstream
/// stream, or the pending open, with it.
pub fn relay(handle: ConversationHandle, open: OpenStream) -> RelayStream {
    Box::pin(async_stream::stream! {
        let mut guard = RelayGuard {
            handle: handle.clone(),
            bytes: 0,
            finished: false,
        };

        yield Ok(SseFrame::conversation(&handle).encode());

        match open.await {
            Ok(mut upstream) => {
                while let Some(chunk) = upstream.next().await {
                    match chunk {
                        Ok(bytes) => {
                            guard.bytes += bytes.len();
                            yield Ok(bytes);
                        }
                        Err(err) => {
                            let err = BridgeError::StreamRelay { message: err.to_string() };
                            tracing::error!(conversation = %handle, error = %err, "stream relay failed");
                            yield Ok(SseFrame::error(&err).encode());
                            break;
                        }
                    }
                }
            }
            Err(err) => {
                let err = BridgeError::from(err);
                tracing::error!(conversation = %handle, error = %err, "could not open reply stream");
                yield Ok(SseFrame::error(&err).encode());
            }
        }

        guard.finished = true;
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::{stream, FutureExt};

    fn upstream(items: Vec<Result<Bytes, ApiError>>) -> OpenStream {
        let opened: ByteStream = Box::pin(stream::iter(items));
        futures::future::ready(Ok(opened)).boxed()
    }

    async fn collect(stream: RelayStream) -> Vec<Bytes> {
        stream.map(|item| item.unwrap()).collect().await
    }

    #[test]
    fn frame_encodes_event_and_json_data() {
        let frame = SseFrame::error(&BridgeError::StreamRelay {
            message: "boom".to_string(),
        });
        assert_eq!(
            frame.encode(),
            Bytes::from("event: error\ndata: {\"message\":\"stream relay failed: boom\"}\n\n")
        );
    }

    #[test]
    fn upstream_error_frame_carries_status_and_details() {
        let frame = SseFrame::error(&BridgeError::Upstream {
            status: 429,
            payload: json!({ "error": { "type": "rate_limit_error" } }),
        });
        assert_eq!(frame.data["status"], 429);
        assert_eq!(frame.data["details"]["error"]["type"], "rate_limit_error");
        assert!(frame.data["message"].as_str().unwrap().contains("429"));
    }

    #[test]
    fn conversation_frame_carries_handle_under_all_keys() {
        let frame = SseFrame::conversation(&ConversationHandle::new("c1"));
        assert_eq!(frame.event, "conversation");
        assert_eq!(frame.data["conversationHandle"], "c1");
        assert_eq!(frame.data["threadId"], "c1");
        assert_eq!(frame.data["conversationId"], "c1");
    }

    #[tokio::test]
    async fn header_frame_precedes_relayed_bytes() {
        let handle = ConversationHandle::new("c1");
        let chunks = collect(relay(
            handle.clone(),
            upstream(vec![
                Ok(Bytes::from_static(b"event: a\ndata: 1\n\n")),
                Ok(Bytes::from_static(b"event: b\ndata: 2\n\n")),
            ]),
        ))
        .await;

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0], SseFrame::conversation(&handle).encode());
        assert_eq!(chunks[1], Bytes::from_static(b"event: a\ndata: 1\n\n"));
        assert_eq!(chunks[2], Bytes::from_static(b"event: b\ndata: 2\n\n"));
    }

    #[tokio::test]
    async fn empty_upstream_still_emits_header() {
        let chunks = collect(relay(ConversationHandle::new("c1"), upstream(vec![]))).await;
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].starts_with(b"event: conversation\n"));
    }

    #[tokio::test]
    async fn upstream_failure_becomes_error_frame_and_ends_stream() {
        let chunks = collect(relay(
            ConversationHandle::new("c1"),
            upstream(vec![
                Ok(Bytes::from_static(b"partial")),
                Err(ApiError::network("connection reset")),
                Ok(Bytes::from_static(b"never sent")),
            ]),
        ))
        .await;

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[1], Bytes::from_static(b"partial"));
        assert_eq!(
            chunks[2],
            SseFrame::error(&BridgeError::StreamRelay {
                message: "network error: connection reset".to_string(),
            })
            .encode()
        );
    }

    #[tokio::test]
    async fn open_failure_follows_header_frame() {
        let handle = ConversationHandle::new("c2");
        let open: OpenStream = futures::future::ready(Err(ApiError::upstream(
            429,
            json!({ "error": { "message": "rate limited" } }),
        )))
        .boxed();

        let chunks = collect(relay(handle.clone(), open)).await;

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], SseFrame::conversation(&handle).encode());
        let text = std::str::from_utf8(&chunks[1]).unwrap();
        let data: Value =
            serde_json::from_str(text.strip_prefix("event: error\ndata: ").unwrap().trim_end())
                .unwrap();
        assert_eq!(data["status"], 429);
        assert_eq!(data["details"]["error"]["message"], "rate limited");
    }

    #[tokio::test]
    async fn dropping_relay_releases_upstream() {
        let (tx, rx) = tokio::sync::mpsc::channel::<Result<Bytes, ApiError>>(1);
        let upstream: ByteStream = Box::pin(async_stream::stream! {
            let mut rx = rx;
            while let Some(item) = rx.recv().await {
                yield item;
            }
        });
        let open = futures::future::ready(Ok(upstream)).boxed();

        let mut stream = relay(ConversationHandle::new("c1"), open);
        assert!(stream.next().await.is_some());
        drop(stream);

        assert!(tx.is_closed());
    }
}
