//! Subcommand bodies

use std::sync::Arc;

use anyhow::{Context, Result};
use gemini_mcp_core::ai::{GeminiClient, GenerativeBackend};
use gemini_mcp_core::mcp::McpServer;
use gemini_mcp_core::transport::{http, StdioTransport};
use gemini_mcp_core::{Config, Dispatcher, ToolCatalog};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Gemini client, builtin catalog and retry policy wired into one dispatcher
pub fn build_dispatcher(config: &Config) -> Result<Dispatcher> {
    config.validate().context("Invalid configuration")?;

    let client_config = config.client_config()?;
    let backend: Arc<dyn GenerativeBackend> =
        Arc::new(GeminiClient::new(client_config).context("Failed to create Gemini client")?);
    let catalog = ToolCatalog::builtin().context("Failed to build tool catalog")?;

    info!(
        "Registered {} tools: {}",
        catalog.len(),
        catalog.names().join(", ")
    );

    Ok(Dispatcher::new(
        Arc::new(catalog),
        backend,
        config.retry_config(),
    ))
}

pub async fn stdio(config: &Config) -> Result<()> {
    let dispatcher = build_dispatcher(config)?;
    StdioTransport::new(McpServer::new(dispatcher))
        .run_stdio()
        .await
}

pub async fn serve(config: &Config) -> Result<()> {
    let dispatcher = build_dispatcher(config)?;
    let addr = config.bind_addr()?;

    if config.server.auth_token.is_none() {
        warn!("No auth token configured; every route is open on {}", addr);
    }

    let shutdown = CancellationToken::new();
    let on_signal = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Ctrl-C received, shutting down"),
            Err(e) => warn!("Failed to listen for Ctrl-C: {}", e),
        }
        on_signal.cancel();
    });

    let router = http::router(dispatcher, config.server.auth_token.clone());
    http::serve(router, addr, shutdown).await
}

/// Catalog as pretty JSON; needs no API key
pub fn tools() -> Result<String> {
    let catalog = ToolCatalog::builtin().context("Failed to build tool catalog")?;
    serde_json::to_string_pretty(&catalog.descriptors()).context("Failed to encode tool catalog")
}
