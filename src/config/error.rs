//! Configuration error types

use thiserror::Error;

/// Errors that can occur during configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration loading failed: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),
}

/// Errors that can occur during configuration validation
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("Invalid port number")]
    InvalidPort,

    #[error("Invalid socket address: {0}")]
    InvalidSocketAddr(String),

    #[error("Invalid request timeout")]
    InvalidTimeout,

    #[error("Invalid upstream timeout")]
    InvalidUpstreamTimeout,

    #[error("OpenAI base URL must use http or https")]
    InvalidBaseUrl,

    #[error("OpenAI model must not be empty")]
    MissingModel,

    #[error("Poll multiplier must be at least 1.0")]
    InvalidPollMultiplier,

    #[error("Poll attempts must be greater than zero")]
    InvalidPollAttempts,

    #[error("Poll max delay is shorter than the initial delay")]
    InvalidPollDelay,

    #[error("Max prompt length must be greater than zero")]
    InvalidPromptLimit,
}
