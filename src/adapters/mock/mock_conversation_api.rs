//! Mock Conversation API for testing.
//!
//! In-memory stand-in for the upstream conversation service, allowing tests
//! to exercise the bridge without network access.
//!
//! # Features
//!
//! - Known conversations; appending to an unknown handle answers 404
//! - Scripted handle minting and generation statuses
//! - Scripted stream chunks, including mid-stream failures
//! - Error injection per operation
//! - Call tracking for verification
//!
//! # Example
//!
//! ```ignore
//! let api = MockConversationApi::new()
//!     .with_minted_handles(["c1"])
//!     .with_reply("Hello!");
//!
//! let bridge = ConversationBridge::new(Arc::new(api.clone()), BridgeSettings::default());
//! ```

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream;
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::domain::conversation::{
    ContentBlock, ConversationHandle, Message, MessageRole, RunState,
};
use crate::ports::{ApiError, ByteStream, ConversationApi, GenerateOptions, Generation};

/// Upstream operations, used to target injected errors and count calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiOperation {
    CreateConversation,
    GetConversation,
    AppendMessage,
    GenerateReply,
    GetGeneration,
    OpenReplyStream,
    ListMessages,
}

/// A recorded call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    CreateConversation,
    GetConversation(String),
    AppendMessage {
        handle: String,
        role: MessageRole,
        text: String,
    },
    GenerateReply {
        handle: String,
        model: Option<String>,
    },
    GetGeneration(String),
    OpenReplyStream {
        handle: String,
        model: Option<String>,
    },
    ListMessages(String),
}

impl MockCall {
    pub fn operation(&self) -> ApiOperation {
        match self {
            MockCall::CreateConversation => ApiOperation::CreateConversation,
            MockCall::GetConversation(_) => ApiOperation::GetConversation,
            MockCall::AppendMessage { .. } => ApiOperation::AppendMessage,
            MockCall::GenerateReply { .. } => ApiOperation::GenerateReply,
            MockCall::GetGeneration(_) => ApiOperation::GetGeneration,
            MockCall::OpenReplyStream { .. } => ApiOperation::OpenReplyStream,
            MockCall::ListMessages(_) => ApiOperation::ListMessages,
        }
    }
}

/// One scripted stream item.
#[derive(Debug, Clone)]
pub enum MockChunk {
    Bytes(Bytes),
    Error(ApiError),
}

#[derive(Debug, Default)]
struct MockState {
    conversations: HashMap<String, Vec<Message>>,
    minted: VecDeque<String>,
    minted_count: usize,
    reply: Option<String>,
    initial_status: Option<RunState>,
    poll_statuses: VecDeque<RunState>,
    pending: HashMap<String, String>,
    generation_count: usize,
    stream_chunks: Vec<MockChunk>,
    errors: HashMap<ApiOperation, VecDeque<ApiError>>,
    calls: Vec<MockCall>,
}

/// Mock conversation API for testing.
///
/// Clones share state, so a test can keep one clone for assertions while the
/// bridge owns another.
#[derive(Debug, Clone)]
pub struct MockConversationApi {
    state: Arc<Mutex<MockState>>,
}

impl Default for MockConversationApi {
    fn default() -> Self {
        Self::new()
    }
}

impl MockConversationApi {
    /// Creates a mock whose generations complete immediately.
    pub fn new() -> Self {
        let state = MockState {
            initial_status: Some(RunState::Completed),
            ..Default::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers an existing conversation.
    pub fn with_conversation(self, handle: impl Into<String>) -> Self {
        self.state().conversations.entry(handle.into()).or_default();
        self
    }

    /// Queues handles returned by `create_conversation`, in order.
    pub fn with_minted_handles<I, S>(self, handles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.state().minted.extend(handles.into_iter().map(Into::into));
        self
    }

    /// Sets the assistant text appended when a generation completes.
    pub fn with_reply(self, text: impl Into<String>) -> Self {
        self.state().reply = Some(text.into());
        self
    }

    /// Sets the status reported by `generate_reply`. `None` omits the field.
    pub fn with_generation_status(self, status: Option<RunState>) -> Self {
        self.state().initial_status = status;
        self
    }

    /// Queues statuses returned by successive polls. The last one repeats.
    pub fn with_poll_statuses<I: IntoIterator<Item = RunState>>(self, statuses: I) -> Self {
        self.state().poll_statuses.extend(statuses);
        self
    }

    /// Sets the chunks yielded by `open_reply_stream`.
    pub fn with_stream_chunks<I: IntoIterator<Item = MockChunk>>(self, chunks: I) -> Self {
        self.state().stream_chunks = chunks.into_iter().collect();
        self
    }

    /// Queues an error for the next call of `operation`.
    pub fn with_error(self, operation: ApiOperation, error: ApiError) -> Self {
        self.state()
            .errors
            .entry(operation)
            .or_default()
            .push_back(error);
        self
    }

    /// Returns the total number of upstream calls made.
    pub fn call_count(&self) -> usize {
        self.state().calls.len()
    }

    /// Returns the number of calls made to one operation.
    pub fn count_of(&self, operation: ApiOperation) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|c| c.operation() == operation)
            .count()
    }

    /// Returns all recorded calls.
    pub fn calls(&self) -> Vec<MockCall> {
        self.state().calls.clone()
    }

    /// Returns the messages stored for a conversation.
    pub fn messages(&self, handle: &str) -> Vec<Message> {
        self.state()
            .conversations
            .get(handle)
            .cloned()
            .unwrap_or_default()
    }

    /// Records a call and returns the injected error for it, if any.
    fn record(&self, call: MockCall) -> Result<(), ApiError> {
        let mut state = self.state();
        let operation = call.operation();
        state.calls.push(call);
        match state.errors.get_mut(&operation).and_then(VecDeque::pop_front) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

fn not_found(handle: &str) -> ApiError {
    ApiError::upstream(
        404,
        json!({
            "error": {
                "message": format!("Conversation with id '{}' not found.", handle),
                "type": "invalid_request_error",
                "code": null
            }
        }),
    )
}

impl MockState {
    fn append(&mut self, handle: &str, role: MessageRole, text: &str) -> Result<(), ApiError> {
        let sequence = self.conversations.values().map(Vec::len).sum();
        let messages = self
            .conversations
            .get_mut(handle)
            .ok_or_else(|| not_found(handle))?;
        messages.push(Message::new(role, vec![ContentBlock::text(text)], sequence));
        Ok(())
    }

    fn complete(&mut self, handle: &str) -> Result<(), ApiError> {
        match self.reply.clone() {
            Some(reply) => self.append(handle, MessageRole::Assistant, &reply),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ConversationApi for MockConversationApi {
    async fn create_conversation(&self) -> Result<ConversationHandle, ApiError> {
        self.record(MockCall::CreateConversation)?;

        let mut state = self.state();
        state.minted_count += 1;
        let id = match state.minted.pop_front() {
            Some(id) => id,
            None => format!("conv_mock_{}", state.minted_count),
        };
        state.conversations.entry(id.clone()).or_default();
        Ok(ConversationHandle::new(id))
    }

    async fn get_conversation(&self, handle: &ConversationHandle) -> Result<(), ApiError> {
        self.record(MockCall::GetConversation(handle.to_string()))?;

        if self.state().conversations.contains_key(handle.as_str()) {
            Ok(())
        } else {
            Err(not_found(handle.as_str()))
        }
    }

    async fn append_message(
        &self,
        handle: &ConversationHandle,
        role: MessageRole,
        text: &str,
    ) -> Result<(), ApiError> {
        self.record(MockCall::AppendMessage {
            handle: handle.to_string(),
            role,
            text: text.to_string(),
        })?;

        self.state().append(handle.as_str(), role, text)
    }

    async fn generate_reply(
        &self,
        handle: &ConversationHandle,
        options: &GenerateOptions,
    ) -> Result<Generation, ApiError> {
        self.record(MockCall::GenerateReply {
            handle: handle.to_string(),
            model: options.model.clone(),
        })?;

        let mut state = self.state();
        if !state.conversations.contains_key(handle.as_str()) {
            return Err(not_found(handle.as_str()));
        }
        state.generation_count += 1;
        let id = format!("resp_mock_{}", state.generation_count);
        let generation = Generation::new(id.clone(), state.initial_status.clone());

        if generation.is_done() {
            state.complete(handle.as_str())?;
        } else {
            state.pending.insert(id, handle.to_string());
        }
        Ok(generation)
    }

    async fn get_generation(
        &self,
        _handle: &ConversationHandle,
        generation_id: &str,
    ) -> Result<Generation, ApiError> {
        self.record(MockCall::GetGeneration(generation_id.to_string()))?;

        let mut state = self.state();
        let next = if state.poll_statuses.len() > 1 {
            state.poll_statuses.pop_front()
        } else {
            state.poll_statuses.front().cloned()
        };
        let status = next.unwrap_or(RunState::Completed);

        if status.is_completed() {
            if let Some(handle) = state.pending.remove(generation_id) {
                state.complete(&handle)?;
            }
        }
        Ok(Generation::new(generation_id, Some(status)))
    }

    async fn open_reply_stream(
        &self,
        handle: &ConversationHandle,
        options: &GenerateOptions,
    ) -> Result<ByteStream, ApiError> {
        self.record(MockCall::OpenReplyStream {
            handle: handle.to_string(),
            model: options.model.clone(),
        })?;

        let chunks: Vec<Result<Bytes, ApiError>> = self
            .state()
            .stream_chunks
            .iter()
            .cloned()
            .map(|chunk| match chunk {
                MockChunk::Bytes(bytes) => Ok(bytes),
                MockChunk::Error(err) => Err(err),
            })
            .collect();

        Ok(Box::pin(stream::iter(chunks)))
    }

    async fn list_messages(&self, handle: &ConversationHandle) -> Result<Vec<Message>, ApiError> {
        self.record(MockCall::ListMessages(handle.to_string()))?;

        self.state()
            .conversations
            .get(handle.as_str())
            .cloned()
            .ok_or_else(|| not_found(handle.as_str()))
    }
}
