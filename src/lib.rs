pub mod api;
pub mod config;
pub mod error;
pub mod state;
pub mod tools;
pub mod workflow;

use state::AppState;
use std::sync::Arc;

/// Load config, build the engine and serve the local HTTP API until it stops.
pub async fn run() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    // Never overwrite an existing file on failure
    let config = match config::load_config() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("Failed to load config: {}. Using in-memory defaults (not saving).", e);
            config::AppConfig::default()
        }
    };

    for problem in config::validate_config(&config) {
        tracing::warn!("Config: {}", problem);
    }

    let state = Arc::new(AppState::new(config)?);
    let server = state.config.read().server.clone();
    tracing::info!(
        "Workflow engine ready: {} workflow(s), {} tool integration(s)",
        state.engine.list_workflows().len(),
        state.engine.list_tools().len()
    );

    if !server.enabled || server.port == 0 {
        tracing::warn!("HTTP API disabled in config; nothing to serve");
        return Ok(());
    }

    api::run_server(state, server.port, server.api_key)
        .await
        .map_err(anyhow::Error::msg)
}
