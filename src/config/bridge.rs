//! Conversation bridge configuration

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;
use crate::application::BridgeSettings;
use crate::domain::backoff::BackoffPolicy;

/// Bridge configuration section
#[derive(Debug, Clone, Deserialize)]
pub struct BridgeConfig {
    /// Delay before the first generation poll, in milliseconds
    #[serde(default = "default_poll_initial_delay")]
    pub poll_initial_delay_ms: u64,

    /// Growth factor between polls
    #[serde(default = "default_poll_multiplier")]
    pub poll_multiplier: f64,

    /// Upper bound on a single poll delay, in milliseconds
    #[serde(default = "default_poll_max_delay")]
    pub poll_max_delay_ms: u64,

    /// Maximum number of polls per generation
    #[serde(default = "default_poll_max_attempts")]
    pub poll_max_attempts: u32,

    /// Check supplied handles upstream before appending
    #[serde(default)]
    pub verify_handle: bool,

    /// Longest accepted prompt, in characters
    #[serde(default = "default_max_prompt_chars")]
    pub max_prompt_chars: usize,
}

impl BridgeConfig {
    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy::new(
            Duration::from_millis(self.poll_initial_delay_ms),
            self.poll_multiplier,
            Duration::from_millis(self.poll_max_delay_ms),
            self.poll_max_attempts,
        )
    }

    pub fn settings(&self) -> BridgeSettings {
        BridgeSettings {
            backoff: self.backoff(),
            verify_handle: self.verify_handle,
            max_prompt_chars: self.max_prompt_chars,
        }
    }

    /// Validate bridge configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.poll_multiplier.is_finite() || self.poll_multiplier < 1.0 {
            return Err(ValidationError::InvalidPollMultiplier);
        }
        if self.poll_max_attempts == 0 {
            return Err(ValidationError::InvalidPollAttempts);
        }
        if self.poll_max_delay_ms < self.poll_initial_delay_ms {
            return Err(ValidationError::InvalidPollDelay);
        }
        if self.max_prompt_chars == 0 {
            return Err(ValidationError::InvalidPromptLimit);
        }
        Ok(())
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            poll_initial_delay_ms: default_poll_initial_delay(),
            poll_multiplier: default_poll_multiplier(),
            poll_max_delay_ms: default_poll_max_delay(),
            poll_max_attempts: default_poll_max_attempts(),
            verify_handle: false,
            max_prompt_chars: default_max_prompt_chars(),
        }
    }
}

fn default_poll_initial_delay() -> u64 {
    1000
}

fn default_poll_multiplier() -> f64 {
    1.8
}

fn default_poll_max_delay() -> u64 {
    5000
}

fn default_poll_max_attempts() -> u32 {
    10
}

fn default_max_prompt_chars() -> usize {
    4000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_bridge_defaults() {
        let config = BridgeConfig::default();
        assert_eq!(config.settings(), BridgeSettings::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_backoff_uses_configured_schedule() {
        let config = BridgeConfig {
            poll_initial_delay_ms: 10,
            poll_multiplier: 2.0,
            poll_max_delay_ms: 30,
            poll_max_attempts: 4,
            ..Default::default()
        };
        let delays: Vec<u64> = config
            .backoff()
            .delays()
            .map(|d| d.as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![10, 20, 30, 30]);
    }

    #[test]
    fn test_validation_rejects_shrinking_multiplier() {
        let config = BridgeConfig {
            poll_multiplier: 0.5,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ValidationError::InvalidPollMultiplier));
    }

    #[test]
    fn test_validation_rejects_zero_attempts() {
        let config = BridgeConfig {
            poll_max_attempts: 0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ValidationError::InvalidPollAttempts));
    }

    #[test]
    fn test_validation_rejects_inverted_delays() {
        let config = BridgeConfig {
            poll_initial_delay_ms: 6000,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ValidationError::InvalidPollDelay));
    }
}
