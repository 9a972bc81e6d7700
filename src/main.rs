//! Portfolio chat server.
//!
//! Loads configuration from the environment, wires the OpenAI adapter into
//! the conversation bridge, and serves the chat endpoint until Ctrl-C.

use std::sync::Arc;

use anyhow::{Context, Result};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use portfolio_chat::adapters::http::{chat_router, cors_layer, ChatAppState};
use portfolio_chat::adapters::OpenAIConversationApi;
use portfolio_chat::config::AppConfig;
use portfolio_chat::ports::ConversationApi;

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load().context("load configuration")?;
    init_tracing(&config);
    config.validate().context("validate configuration")?;

    let api: Arc<dyn ConversationApi> = Arc::new(
        OpenAIConversationApi::new(config.openai.to_adapter_config())
            .context("build upstream client")?,
    );
    let state = ChatAppState::new(api, config.bridge.settings());

    let app = chat_router(state, config.server.health_timeout())
        .layer(cors_layer(&config.server.cors_origins_list()))
        .layer(TraceLayer::new_for_http());

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind {}", addr))?;
    tracing::info!(
        bind = %addr,
        model = %config.openai.model,
        environment = ?config.server.environment,
        "portfolio-chat listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutting down");
        })
        .await
        .context("serve")
}

/// JSON logs in production, human-readable otherwise. `RUST_LOG` overrides
/// the configured filter.
fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.server.log_level));

    if config.is_production() {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}
