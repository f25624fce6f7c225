//! Service configuration.
//!
//! Loaded once at startup, highest priority first:
//!
//! 1. CLI flags and their env aliases (`--port`/`PORT`, `--config`/`CONFIG_FILE`)
//! 2. `ORCH_`-prefixed environment variables, `__` between sections
//!    (`ORCH_SERVER__PORT=8080`, `ORCH_TIMEOUTS__INVOCATION_MS=5000`)
//! 3. The config file (`CONFIG_FILE`, else `./config.yaml` when present)
//! 4. Built-in defaults
//!
//! `${VAR}` placeholders in tool-server URLs and credentials are expanded
//! here and nowhere else.

use std::{collections::HashMap, path::Path, sync::Arc, time::Duration};

use anyhow::Context;
use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;

use crate::agents::AgentSpec;
use crate::agents::router::{KeywordRouter, RoutingRule};
use crate::defaults;
use crate::llm::{LlmSettings, ProviderSet};
use crate::mcp::{ToolServerDefinition, ToolServerRegistry};
use crate::workflow::EngineSettings;

const DEFAULT_CONFIG_FILE: &str = "config.yaml";

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file path
    #[arg(short, long, env = "CONFIG_FILE")]
    pub config: Option<String>,

    /// Port to listen on
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,

    /// Address to bind
    #[arg(long, env = "HOST")]
    pub host: Option<String>,

    /// Tool-call rounds allowed per request
    #[arg(long, env = "MAX_TOOL_ITERATIONS")]
    pub max_tool_iterations: Option<usize>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub timeouts: TimeoutConfig,
    pub workflow: WorkflowConfig,
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub tool_servers: Vec<ToolServerDefinition>,
    /// Empty means the built-in roster.
    #[serde(default)]
    pub agents: Vec<AgentSpec>,
    /// Empty means the built-in rules.
    #[serde(default)]
    pub routing: Vec<RoutingRule>,
    #[serde(default)]
    pub llm: Option<LlmConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TimeoutConfig {
    /// Per-server discovery timeout.
    pub discovery_ms: u64,
    /// Whole discovery pass.
    pub discovery_budget_ms: u64,
    pub invocation_ms: u64,
    pub provider_ms: u64,
    pub cancellation_grace_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WorkflowConfig {
    pub max_tool_iterations: usize,
    pub event_buffer: usize,
    pub default_agent: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DiscoveryConfig {
    /// How long a reachable discovery result is reused; 0 disables caching.
    pub cache_ttl_secs: u64,
}

/// Decision-provider endpoint with an optional fallback.
#[derive(Deserialize, Clone)]
pub struct LlmConfig {
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    pub model: String,
    #[serde(default)]
    pub azure_deployment: Option<String>,
    #[serde(default)]
    pub azure_api_version: Option<String>,
    #[serde(default)]
    pub fallback: Option<LlmSettings>,
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("primary", &self.primary())
            .field("fallback", &self.fallback)
            .finish()
    }
}

impl LlmConfig {
    pub fn primary(&self) -> LlmSettings {
        LlmSettings {
            base_url: self.base_url.clone(),
            api_key: self.api_key.clone(),
            model: self.model.clone(),
            azure_deployment: self.azure_deployment.clone(),
            azure_api_version: self.azure_api_version.clone(),
        }
    }
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from_args(std::env::args())
    }

    pub fn load_from_args<I, T>(args: I) -> anyhow::Result<Self>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let cli = Cli::try_parse_from(args).context("invalid command line")?;

        let mut builder = Config::builder()
            .set_default("server.port", 4000)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("timeouts.discovery_ms", 5000)?
            .set_default("timeouts.discovery_budget_ms", 8000)?
            .set_default("timeouts.invocation_ms", 30_000)?
            .set_default("timeouts.provider_ms", 60_000)?
            .set_default("timeouts.cancellation_grace_ms", 2000)?
            .set_default("workflow.max_tool_iterations", 10)?
            .set_default("workflow.event_buffer", 64)?
            .set_default("workflow.default_agent", defaults::DEFAULT_AGENT)?
            .set_default("discovery.cache_ttl_secs", 30)?;

        match cli.config.as_deref() {
            Some(path) => {
                builder = builder.add_source(File::from(Path::new(path)).required(true));
            }
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                builder = builder.add_source(File::from(Path::new(DEFAULT_CONFIG_FILE)));
            }
            None => {}
        }

        builder = builder.add_source(
            Environment::with_prefix("ORCH")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        if let Some(port) = cli.port {
            builder = builder.set_override("server.port", i64::from(port))?;
        }
        if let Some(host) = cli.host {
            builder = builder.set_override("server.host", host)?;
        }
        if let Some(max) = cli.max_tool_iterations {
            builder = builder.set_override("workflow.max_tool_iterations", max as u64)?;
        }

        let mut cfg: Self = builder
            .build()
            .context("failed to assemble configuration")?
            .try_deserialize()
            .context("invalid configuration")?;

        let vars: HashMap<String, String> = std::env::vars().collect();
        cfg.tool_servers = cfg
            .tool_servers
            .into_iter()
            .map(|s| s.expanded(&vars))
            .collect();

        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.workflow.max_tool_iterations > 0,
            "workflow.max_tool_iterations must be at least 1"
        );
        anyhow::ensure!(
            self.timeouts.invocation_ms > 0 && self.timeouts.provider_ms > 0,
            "invocation and provider timeouts must be positive"
        );
        for rule in &self.routing {
            anyhow::ensure!(
                !rule.agents.is_empty(),
                "routing rule {:?} names no agents",
                rule.keywords
            );
        }
        Ok(())
    }

    /// Tool Server Registry snapshot. Rejects duplicate ids.
    pub fn registry(&self) -> anyhow::Result<ToolServerRegistry> {
        ToolServerRegistry::new(self.tool_servers.clone())
    }

    pub fn agent_specs(&self) -> Vec<AgentSpec> {
        if self.agents.is_empty() {
            defaults::agents()
        } else {
            self.agents.clone()
        }
    }

    pub fn routing_rules(&self) -> Vec<RoutingRule> {
        if self.routing.is_empty() {
            defaults::routing_rules()
        } else {
            self.routing.clone()
        }
    }

    pub fn router(&self) -> Arc<KeywordRouter> {
        Arc::new(KeywordRouter::new(
            self.routing_rules(),
            self.workflow.default_agent.clone(),
        ))
    }

    pub fn providers(&self) -> ProviderSet {
        match &self.llm {
            Some(llm) => ProviderSet::from_settings(Some(&llm.primary()), llm.fallback.as_ref()),
            None => ProviderSet::from_settings(None, None),
        }
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            max_tool_iterations: self.workflow.max_tool_iterations,
            invocation_timeout: Duration::from_millis(self.timeouts.invocation_ms),
            provider_timeout: Duration::from_millis(self.timeouts.provider_ms),
            cancellation_grace: Duration::from_millis(self.timeouts.cancellation_grace_ms),
            event_buffer: self.workflow.event_buffer,
        }
    }

    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_millis(self.timeouts.discovery_ms)
    }

    pub fn discovery_budget(&self) -> Duration {
        Duration::from_millis(self.timeouts.discovery_budget_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.discovery.cache_ttl_secs)
    }
}
