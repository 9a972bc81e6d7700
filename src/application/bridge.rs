//! ConversationBridge - stateless chat request against a stateful upstream.
//!
//! Each call runs strictly in sequence:
//!
//! 1. resolve the caller's handle, minting a new conversation when it is
//!    absent or no longer known upstream
//! 2. append the prompt as a user message
//! 3. generate a reply, either buffered (polling with capped backoff) or as
//!    a relayed event stream
//! 4. for buffered calls, extract the text of the latest assistant message
//!
//! The handle is returned to the caller; nothing is kept between calls.

use std::sync::Arc;

use thiserror::Error;
use tokio::time::sleep;

use super::relay::{relay, OpenStream, RelayStream};
use crate::domain::backoff::BackoffPolicy;
use crate::domain::conversation::{
    extract_reply_text, ConversationHandle, MessageRole, RunState,
};
use crate::ports::{ApiError, ConversationApi, GenerateOptions, Generation};

/// Default upper bound on prompt length, in characters.
pub const DEFAULT_MAX_PROMPT_CHARS: usize = 4000;

/// Tunables for the bridge.
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeSettings {
    /// Poll schedule for asynchronous generations.
    pub backoff: BackoffPolicy,
    /// Check a supplied handle with `get_conversation` before appending.
    pub verify_handle: bool,
    /// Prompts longer than this are rejected.
    pub max_prompt_chars: usize,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            backoff: BackoffPolicy::default(),
            verify_handle: false,
            max_prompt_chars: DEFAULT_MAX_PROMPT_CHARS,
        }
    }
}

/// Command to send one chat message.
#[derive(Debug, Clone)]
pub struct ChatCommand {
    /// Visitor text, forwarded verbatim.
    pub prompt: String,
    /// Handle from a previous reply, if any.
    pub handle: Option<ConversationHandle>,
    /// Model override.
    pub model: Option<String>,
}

impl ChatCommand {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            handle: None,
            model: None,
        }
    }

    pub fn with_handle(mut self, handle: Option<ConversationHandle>) -> Self {
        self.handle = handle;
        self
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model.filter(|m| !m.trim().is_empty());
        self
    }

    fn generate_options(&self) -> GenerateOptions {
        GenerateOptions {
            model: self.model.clone(),
        }
    }
}

/// Result of a buffered chat call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatReply {
    pub reply: String,
    pub handle: ConversationHandle,
}

/// Result of a streaming chat call.
pub struct ChatStream {
    pub handle: ConversationHandle,
    pub body: RelayStream,
}

/// Errors surfaced to the caller.
#[derive(Debug, Clone, Error)]
pub enum BridgeError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("upstream request failed ({status}): {payload}")]
    Upstream {
        status: u16,
        payload: serde_json::Value,
    },

    #[error("generation did not complete (last state: {last_state})")]
    GenerationIncomplete { last_state: RunState },

    #[error("stream relay failed: {message}")]
    StreamRelay { message: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("parse error: {0}")]
    Parse(String),
}

impl From<ApiError> for BridgeError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Configuration(msg) => BridgeError::Configuration(msg),
            ApiError::Upstream { status, payload } => BridgeError::Upstream { status, payload },
            ApiError::Network(msg) => BridgeError::Network(msg),
            ApiError::Parse(msg) => BridgeError::Parse(msg),
        }
    }
}

/// Bridges stateless chat calls to the upstream conversation API.
pub struct ConversationBridge<A: ?Sized + ConversationApi> {
    api: Arc<A>,
    settings: BridgeSettings,
}

impl<A: ?Sized + ConversationApi> ConversationBridge<A> {
    pub fn new(api: Arc<A>, settings: BridgeSettings) -> Self {
        Self { api, settings }
    }

    pub fn settings(&self) -> &BridgeSettings {
        &self.settings
    }

    /// Rejects blank or oversized prompts before any upstream call.
    pub fn validate(&self, cmd: &ChatCommand) -> Result<(), BridgeError> {
        if cmd.prompt.trim().is_empty() {
            return Err(BridgeError::InvalidInput(
                "prompt must be a non-empty string".to_string(),
            ));
        }
        if cmd.prompt.chars().count() > self.settings.max_prompt_chars {
            return Err(BridgeError::InvalidInput(format!(
                "prompt exceeds {} characters",
                self.settings.max_prompt_chars
            )));
        }
        Ok(())
    }

    /// Sends the prompt and waits for the full reply.
    pub async fn reply(&self, cmd: ChatCommand) -> Result<ChatReply, BridgeError> {
        self.validate(&cmd)?;

        let handle = self.resolve_and_append(cmd.handle.clone(), &cmd.prompt).await?;

        let generation = self
            .api
            .generate_reply(&handle, &cmd.generate_options())
            .await?;
        self.wait_for_generation(&handle, generation).await?;

        let messages = self.api.list_messages(&handle).await?;
        let reply = extract_reply_text(&messages);
        if reply.is_empty() {
            tracing::warn!(conversation = %handle, "generation completed without assistant text");
        }

        Ok(ChatReply { reply, handle })
    }

    /// Sends the prompt and returns a relayed reply stream.
    ///
    /// Handle resolution and append complete before this returns, so their
    /// failures are ordinary errors. The upstream stream is opened by the
    /// relay after the handle frame, and an open failure arrives in-band.
    pub async fn stream(&self, cmd: ChatCommand) -> Result<ChatStream, BridgeError>
    where
        A: 'static,
    {
        self.validate(&cmd)?;

        let handle = self.resolve_and_append(cmd.handle.clone(), &cmd.prompt).await?;

        let api = Arc::clone(&self.api);
        let options = cmd.generate_options();
        let target = handle.clone();
        let open: OpenStream =
            Box::pin(async move { api.open_reply_stream(&target, &options).await });

        tracing::debug!(conversation = %handle, "relaying reply stream");
        Ok(ChatStream {
            body: relay(handle.clone(), open),
            handle,
        })
    }

    /// Appends the prompt, replacing a missing or expired handle once.
    async fn resolve_and_append(
        &self,
        handle: Option<ConversationHandle>,
        prompt: &str,
    ) -> Result<ConversationHandle, BridgeError> {
        let Some(handle) = handle else {
            return self.start_conversation(prompt).await;
        };

        if self.settings.verify_handle {
            match self.api.get_conversation(&handle).await {
                Ok(()) => {}
                Err(err) if err.is_not_found() => {
                    tracing::warn!(stale = %handle, "conversation not found upstream; starting a new one");
                    return self.start_conversation(prompt).await;
                }
                Err(err) => return Err(err.into()),
            }
        }

        match self.api.append_message(&handle, MessageRole::User, prompt).await {
            Ok(()) => Ok(handle),
            Err(err) if err.is_not_found() => {
                tracing::warn!(stale = %handle, error = %err, "conversation handle rejected; starting a new one");
                self.start_conversation(prompt).await
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn start_conversation(&self, prompt: &str) -> Result<ConversationHandle, BridgeError> {
        let handle = self.api.create_conversation().await?;
        tracing::info!(conversation = %handle, "started conversation");

        self.api
            .append_message(&handle, MessageRole::User, prompt)
            .await?;
        Ok(handle)
    }

    /// Polls until the generation completes or the backoff budget runs out.
    async fn wait_for_generation(
        &self,
        handle: &ConversationHandle,
        generation: Generation,
    ) -> Result<(), BridgeError> {
        let Some(mut last_state) = generation.status.clone() else {
            return Ok(());
        };

        for (attempt, delay) in self.settings.backoff.delays().enumerate() {
            if last_state.is_completed() {
                return Ok(());
            }
            if last_state.is_terminal_failure() {
                break;
            }

            sleep(delay).await;
            let polled = self.api.get_generation(handle, &generation.id).await?;
            tracing::debug!(
                conversation = %handle,
                generation = %generation.id,
                attempt = attempt + 1,
                status = ?polled.status,
                "polled generation"
            );

            match polled.status {
                Some(state) => last_state = state,
                None => return Ok(()),
            }
        }

        if last_state.is_completed() {
            return Ok(());
        }

        tracing::warn!(
            conversation = %handle,
            generation = %generation.id,
            last_state = %last_state,
            "generation did not complete"
        );
        Err(BridgeError::GenerationIncomplete { last_state })
    }
}
