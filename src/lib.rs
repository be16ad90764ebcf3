// Declare the modules
pub mod api;
pub mod client;
pub mod config;
pub mod controller;
pub mod gateway;
pub mod models;
pub mod storage;

use crate::api::{GeminiProvider, GenerativeProvider};
use crate::config::Config;
use anyhow::{Context, Result};
use std::sync::Arc;

/// Runs the gateway service: resolves configuration and the provider
/// credential, then serves the two proxy endpoints until shutdown.
pub async fn run() -> Result<()> {
    let config = Config::from_env()?;
    let api_key = config::resolve_api_key(&config.gemini_key_ref)?;

    let provider: Arc<dyn GenerativeProvider> = Arc::new(GeminiProvider::new(api_key)?);
    let app = gateway::router(provider);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind gateway to {}", config.bind_addr))?;
    log::info!("Gateway listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .await
        .context("Gateway server error")?;
    Ok(())
}
