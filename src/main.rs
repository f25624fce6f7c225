//! MCP Orchestrator server
//!
//! Entry point for the agent/tool orchestration service.

use std::sync::Arc;

use anyhow::Context;
use mimalloc::MiMalloc;

use mcp_orchestrator::{config::AppConfig, server, telemetry};

/// Global allocator for improved performance (M-MIMALLOC-APPS).
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env (if present) before anything reads the environment.
    let _ = dotenvy::dotenv();

    // Initialize tracing (M-LOG-STRUCTURED)
    telemetry::init();

    let metrics = match telemetry::install_metrics() {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::warn!(error = %e, "Metrics recorder not installed");
            None
        }
    };

    let config = AppConfig::load().context("failed to load configuration")?;
    tracing::info!(
        name: "config.loaded",
        port = config.server.port,
        tool_servers = config.tool_servers.len(),
        agents = config.agent_specs().len(),
        max_tool_iterations = config.workflow.max_tool_iterations,
        "Configuration loaded"
    );

    server::start_server(Arc::new(config), metrics).await
}
