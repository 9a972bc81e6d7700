//! Application configuration module
//!
//! Type-safe configuration loaded from environment variables using the
//! `config` and `dotenvy` crates. Variables use the `PORTFOLIO_CHAT` prefix
//! and nested values are separated by double underscores.
//!
//! # Example
//!
//! ```no_run
//! use portfolio_chat::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//! ```

mod bridge;
mod error;
mod openai;
mod server;

pub use bridge::BridgeConfig;
pub use error::{ConfigError, ValidationError};
pub use openai::OpenAiConfig;
pub use server::{Environment, ServerConfig};

use serde::Deserialize;

/// Root application configuration
///
/// Every section has defaults, so an empty environment loads successfully.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// Server configuration (host, port, environment, CORS)
    #[serde(default)]
    pub server: ServerConfig,

    /// Upstream API configuration
    #[serde(default)]
    pub openai: OpenAiConfig,

    /// Polling and handle policy
    #[serde(default)]
    pub bridge: BridgeConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// 1. Loads `.env` file if present (for development)
    /// 2. Reads environment variables with `PORTFOLIO_CHAT` prefix
    /// 3. Uses `__` (double underscore) to separate nested values
    /// 4. Falls back to `OPENAI_API_KEY` when no prefixed key is set
    ///
    /// # Environment Variable Format
    ///
    /// - `PORTFOLIO_CHAT__SERVER__PORT=8080` -> `server.port = 8080`
    /// - `PORTFOLIO_CHAT__OPENAI__MODEL=...` -> `openai.model = ...`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if values cannot be parsed into expected types.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let mut config: AppConfig = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix("PORTFOLIO_CHAT")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        config.openai = config
            .openai
            .with_fallback_key(std::env::var("OPENAI_API_KEY").ok());

        Ok(config)
    }

    /// Validate all configuration values
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if any configuration value is invalid.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.server.validate()?;
        self.openai.validate()?;
        self.bridge.validate()?;
        Ok(())
    }

    /// Check if running in production environment
    pub fn is_production(&self) -> bool {
        self.server.is_production()
    }
}
