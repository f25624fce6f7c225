//! MCP Orchestrator
//!
//! Agent/tool orchestration with a live event stream. A request is routed to
//! one or more agents; each agent works through a decision provider that can
//! call tools discovered on independently deployed tool servers. Every step
//! is streamed back to the client as an ordered sequence of events.
//!
//! # Architecture
//!
//! - **Registry**: configured tool servers, read-only after load
//! - **Discovery / Invocation**: concurrent, failure-isolated tool server access
//! - **Agents / Router**: pure binding and routing over discovery results
//! - **Workflow Engine**: per-request state machine emitting [`events::WorkflowEvent`]s
//! - **Gateway**: Axum HTTP surface streaming NDJSON or SSE
//!
//! # Modules
//!
//! - [`mcp`]: tool server registry, transports, discovery and invocation
//! - [`llm`]: decision-provider trait and implementations
//! - [`agents`]: agent binding and routing
//! - [`workflow`]: the workflow engine
//! - [`gateway`]: HTTP handlers

// Allow pedantic clippy warnings that don't add value for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::missing_fields_in_debug)]
#![allow(clippy::implicit_hasher)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::default_trait_access)]
#![allow(clippy::unused_async)]

pub mod agents;
pub mod config;
pub mod defaults;
pub mod error;
pub mod events;
pub mod gateway;
pub mod llm;
pub mod mcp;
pub mod server;
pub mod telemetry;
pub mod workflow;

use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;

use crate::config::AppConfig;
use crate::mcp::{DiscoveryService, ToolServerClient, TransportRouter};
use crate::workflow::WorkflowEngine;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Global configuration.
    pub config: Arc<AppConfig>,
    /// Workflow engine; one run per chat request.
    pub engine: WorkflowEngine,
    /// Prometheus handle, when a recorder is installed.
    pub metrics: Option<PrometheusHandle>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("engine", &self.engine)
            .field("metrics", &self.metrics.is_some())
            .finish()
    }
}

impl AppState {
    /// Build the engine from configuration with the default transports.
    pub fn from_config(
        config: Arc<AppConfig>,
        metrics: Option<PrometheusHandle>,
    ) -> anyhow::Result<Self> {
        let client: Arc<dyn ToolServerClient> = Arc::new(TransportRouter::default());
        Self::with_client(config, client, metrics)
    }

    /// Build the engine around an explicit tool-server client.
    pub fn with_client(
        config: Arc<AppConfig>,
        client: Arc<dyn ToolServerClient>,
        metrics: Option<PrometheusHandle>,
    ) -> anyhow::Result<Self> {
        let registry = config.registry()?;
        let providers = config.providers();
        let specs = config.agent_specs();

        // Surface duplicate names and dangling provider references at startup.
        agents::bind(&specs, &[], &providers)?;

        let discovery = DiscoveryService::new(
            client,
            config.cache_ttl(),
            config.discovery_timeout(),
            config.discovery_budget(),
        );
        let engine = WorkflowEngine::new(
            registry,
            discovery,
            providers,
            specs,
            config.router(),
            config.engine_settings(),
        );

        Ok(Self {
            config,
            engine,
            metrics,
        })
    }
}
