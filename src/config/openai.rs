//! Upstream OpenAI configuration

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;
use crate::adapters::openai::OpenAIConfig;

/// OpenAI configuration section
#[derive(Debug, Clone, Deserialize)]
pub struct OpenAiConfig {
    /// API key. Missing is allowed; upstream calls then fail individually.
    pub api_key: Option<SecretString>,

    /// API base URL
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Default model
    #[serde(default = "default_model")]
    pub model: String,

    /// Per-request timeout in seconds (non-streaming calls)
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Run buffered generations in the background and poll for completion
    #[serde(default = "default_background")]
    pub background: bool,
}

impl OpenAiConfig {
    /// Get timeout as Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Check if an API key is configured
    pub fn has_api_key(&self) -> bool {
        self.api_key
            .as_ref()
            .is_some_and(|k| !k.expose_secret().trim().is_empty())
    }

    /// Fills a missing key from the conventional `OPENAI_API_KEY` variable.
    pub fn with_fallback_key(mut self, key: Option<String>) -> Self {
        if !self.has_api_key() {
            self.api_key = key
                .filter(|k| !k.trim().is_empty())
                .map(SecretString::new);
        }
        self
    }

    /// Builds the adapter configuration.
    pub fn to_adapter_config(&self) -> OpenAIConfig {
        let config = OpenAIConfig::without_key()
            .with_base_url(self.base_url.clone())
            .with_model(self.model.clone())
            .with_timeout(self.timeout())
            .with_background(self.background);

        match &self.api_key {
            Some(key) => config.with_api_key(key.expose_secret().clone()),
            None => config,
        }
    }

    /// Validate OpenAI configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !(self.base_url.starts_with("https://") || self.base_url.starts_with("http://")) {
            return Err(ValidationError::InvalidBaseUrl);
        }
        if self.model.trim().is_empty() {
            return Err(ValidationError::MissingModel);
        }
        if self.timeout_secs == 0 || self.timeout_secs > 300 {
            return Err(ValidationError::InvalidUpstreamTimeout);
        }
        if !self.has_api_key() {
            tracing::warn!("OPENAI_API_KEY is not configured; chat requests will fail");
        }
        Ok(())
    }
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_base_url(),
            model: default_model(),
            timeout_secs: default_timeout(),
            background: default_background(),
        }
    }
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-5-nano-2025-08-07".to_string()
}

fn default_timeout() -> u64 {
    60
}

fn default_background() -> bool {
    true
}
