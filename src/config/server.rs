//! Listener, logging and CORS settings.

use serde::Deserialize;
use std::net::SocketAddr;
use std::time::Duration;

use super::error::ValidationError;

/// Upper bound for `request_timeout_secs`.
const MAX_REQUEST_TIMEOUT_SECS: u64 = 300;

/// How the HTTP listener is exposed.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,

    /// `production` switches logs to JSON.
    pub environment: Environment,

    /// Filter directive used when `RUST_LOG` is unset.
    pub log_level: String,

    /// Bounds `/health` only; chat responses may stream for minutes.
    pub request_timeout_secs: u64,

    /// Comma-separated allowed origins. Unset or `*` allows any origin.
    pub cors_origins: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8888,
            environment: Environment::Development,
            log_level: "info,portfolio_chat=debug".to_string(),
            request_timeout_secs: 120,
            cors_origins: None,
        }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ValidationError> {
        let addr = format!("{}:{}", self.host, self.port);
        addr.parse()
            .map_err(|_| ValidationError::InvalidSocketAddr(addr))
    }

    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }

    pub fn health_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Explicit origins only; an empty list means any origin.
    pub fn cors_origins_list(&self) -> Vec<String> {
        self.cors_origins
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty() && *origin != "*")
            .map(String::from)
            .collect()
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort);
        }
        if !(1..=MAX_REQUEST_TIMEOUT_SECS).contains(&self.request_timeout_secs) {
            return Err(ValidationError::InvalidTimeout);
        }
        self.socket_addr().map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_listen_on_8888_in_development() {
        let config = ServerConfig::default();
        assert_eq!(config.socket_addr().unwrap().to_string(), "0.0.0.0:8888");
        assert!(!config.is_production());
        assert_eq!(config.health_timeout(), Duration::from_secs(120));
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn partial_input_keeps_remaining_defaults() {
        let config: ServerConfig =
            serde_json::from_value(serde_json::json!({ "port": 9000, "environment": "production" }))
                .unwrap();
        assert_eq!(config.port, 9000);
        assert!(config.is_production());
        assert_eq!(config.host, "0.0.0.0");
    }

    #[test]
    fn unparseable_host_is_rejected() {
        let config = ServerConfig {
            host: "not a host".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ValidationError::InvalidSocketAddr(_))
        ));
    }

    #[test]
    fn cors_list_skips_blanks_and_wildcard() {
        let config = ServerConfig {
            cors_origins: Some("https://example.dev, ,*, http://localhost:8888".to_string()),
            ..Default::default()
        };
        assert_eq!(
            config.cors_origins_list(),
            vec!["https://example.dev", "http://localhost:8888"]
        );

        let config = ServerConfig {
            cors_origins: Some("*".to_string()),
            ..Default::default()
        };
        assert!(config.cors_origins_list().is_empty());
    }

    #[test]
    fn port_and_timeout_bounds() {
        let zero_port = ServerConfig {
            port: 0,
            ..Default::default()
        };
        assert_eq!(zero_port.validate(), Err(ValidationError::InvalidPort));

        for secs in [0, MAX_REQUEST_TIMEOUT_SECS + 1] {
            let config = ServerConfig {
                request_timeout_secs: secs,
                ..Default::default()
            };
            assert_eq!(config.validate(), Err(ValidationError::InvalidTimeout));
        }
    }
}
