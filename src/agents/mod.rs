//! Agents: instructions, a bound tool pool, and a decision provider.
//!
//! Binding is pure. It takes the agent definitions, the discovery results of
//! the servers the caller allowed, and the provider set, and produces an
//! [`AgentRoster`] without touching the network.

pub mod router;

use std::{collections::HashMap, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::error::BindError;
use crate::llm::{DecisionProvider, ProviderSet, ToolSpec};
use crate::mcp::{DiscoveryResult, ToolDescriptor, ToolKey};

fn default_provider() -> String {
    "default".to_string()
}

/// Declarative agent definition, as configured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub instructions: String,
    /// Servers whose tools this agent may use. Empty means every allowed server.
    #[serde(default)]
    pub tool_servers: Vec<String>,
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Agents this one may hand off to.
    #[serde(default)]
    pub handoffs: Vec<String>,
}

impl AgentSpec {
    pub fn new(name: impl Into<String>, instructions: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            instructions: instructions.into(),
            tool_servers: Vec::new(),
            provider: default_provider(),
            handoffs: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    #[must_use]
    pub fn with_tool_servers<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tool_servers = ids.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_handoffs<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.handoffs = names.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = provider.into();
        self
    }
}

/// A discovered tool bound to an agent.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundTool {
    pub key: ToolKey,
    pub descriptor: ToolDescriptor,
}

impl BoundTool {
    /// Schema offered to the decision provider.
    pub fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.key.function_name(),
            description: self.descriptor.description.clone(),
            parameters: self.descriptor.input_schema.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Agent {
    pub name: String,
    pub description: String,
    pub instructions: String,
    tools: Vec<BoundTool>,
    lookup: HashMap<String, usize>,
    handoffs: Vec<String>,
    provider: Arc<dyn DecisionProvider>,
}

impl Agent {
    pub fn tools(&self) -> &[BoundTool] {
        &self.tools
    }

    pub fn tool_specs(&self) -> Vec<ToolSpec> {
        self.tools.iter().map(BoundTool::spec).collect()
    }

    /// Resolve the function name a provider used back to its tool.
    pub fn resolve(&self, function_name: &str) -> Option<&BoundTool> {
        self.lookup.get(function_name).and_then(|&i| self.tools.get(i))
    }

    pub fn handoffs(&self) -> &[String] {
        &self.handoffs
    }

    pub fn provider(&self) -> Arc<dyn DecisionProvider> {
        Arc::clone(&self.provider)
    }
}

/// Agents of one run, in definition order.
#[derive(Debug, Clone, Default)]
pub struct AgentRoster {
    agents: Vec<Agent>,
    index: HashMap<String, usize>,
}

impl AgentRoster {
    pub fn get(&self, name: &str) -> Option<&Agent> {
        self.index.get(name).and_then(|&i| self.agents.get(i))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.agents.iter().map(|a| a.name.as_str())
    }

    pub fn first(&self) -> Option<&Agent> {
        self.agents.first()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

/// Build the roster for one run.
///
/// `results` must already be restricted to the caller's allow-list; only
/// reachable servers contribute tools. Fails fast on a duplicate agent name or
/// an unknown provider reference.
pub fn bind(
    specs: &[AgentSpec],
    results: &[DiscoveryResult],
    providers: &ProviderSet,
) -> Result<AgentRoster, BindError> {
    let mut roster = AgentRoster::default();

    for spec in specs {
        if roster.contains(&spec.name) {
            return Err(BindError::DuplicateAgent(spec.name.clone()));
        }
        let provider = providers
            .get(&spec.provider)
            .ok_or_else(|| BindError::UnknownProvider {
                agent: spec.name.clone(),
                provider: spec.provider.clone(),
            })?;

        let mut tools = Vec::new();
        let mut lookup = HashMap::new();
        let pool = results.iter().filter(|r| {
            r.reachable && (spec.tool_servers.is_empty() || spec.tool_servers.contains(&r.server_id))
        });
        for result in pool {
            for descriptor in &result.tools {
                let key = ToolKey::new(result.server_id.clone(), descriptor.name.clone());
                let function_name = key.function_name();
                if lookup.contains_key(&function_name) {
                    tracing::warn!(
                        agent = %spec.name,
                        tool = %key,
                        "Tool name collides after sanitizing, keeping the first"
                    );
                    continue;
                }
                lookup.insert(function_name, tools.len());
                tools.push(BoundTool {
                    key,
                    descriptor: descriptor.clone(),
                });
            }
        }

        tracing::debug!(agent = %spec.name, tool_count = tools.len(), "Agent bound");

        roster.index.insert(spec.name.clone(), roster.agents.len());
        roster.agents.push(Agent {
            name: spec.name.clone(),
            description: spec.description.clone(),
            instructions: spec.instructions.clone(),
            tools,
            lookup,
            handoffs: Vec::new(),
            provider,
        });
    }

    // Hand-off targets are limited to agents that exist in this roster.
    let names: Vec<String> = roster.names().map(ToString::to_string).collect();
    for (agent, spec) in roster.agents.iter_mut().zip(specs) {
        agent.handoffs = spec
            .handoffs
            .iter()
            .filter(|h| names.contains(*h) && **h != spec.name)
            .cloned()
            .collect();
    }

    Ok(roster)
}
