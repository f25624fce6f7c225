//! Decision providers: the external model that turns instructions, a
//! conversation and a tool list into text, tool calls or a hand-off.
//!
//! # Overview
//!
//! The [`DecisionProvider`] trait defines one streaming turn. The workflow
//! engine drives turns in a loop, executing requested tools between them.
//!
//! # Providers
//!
//! - [`ChatCompletionsProvider`]: OpenAI-compatible Chat Completions API
//! - [`FallbackProvider`]: retries a failed turn once on a secondary provider
//! - [`UnconfiguredProvider`]: placeholder that always fails, used when no
//!   model endpoint is configured

pub mod chat_completions;
pub mod fallback;
pub mod provider;

pub use chat_completions::ChatCompletionsProvider;
pub use fallback::FallbackProvider;
pub use provider::Provider;

use std::{collections::HashMap, pin::Pin, sync::Arc};

use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

/// Name of the synthetic function through which a model hands off to another agent.
pub const HANDOFF_FUNCTION: &str = "transfer_to_agent";

/// Model endpoint settings.
#[derive(Clone, Deserialize)]
pub struct LlmSettings {
    /// Base URL for the API (e.g., `https://api.openai.com`).
    pub base_url: String,
    /// Optional API key.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Model identifier (e.g., `gpt-4o`).
    pub model: String,
    /// Azure deployment name (Azure `OpenAI` only).
    #[serde(default)]
    pub azure_deployment: Option<String>,
    /// Azure API version (Azure `OpenAI` only).
    #[serde(default)]
    pub azure_api_version: Option<String>,
}

impl std::fmt::Debug for LlmSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmSettings")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("has_api_key", &self.api_key.is_some())
            .field("azure_deployment", &self.azure_deployment)
            .finish()
    }
}

/// Role of a message author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

/// A message in the conversation handed to a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
}

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Self::text(MessageRole::System, text)
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::text(MessageRole::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::text(MessageRole::Assistant, text)
    }

    fn text(role: MessageRole, text: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(text.into()),
            tool_call_id: None,
            tool_calls: None,
        }
    }

    /// Assistant turn that requested tools.
    pub fn assistant_tool_calls(text: Option<String>, calls: Vec<ToolCall>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: text.filter(|t| !t.is_empty()),
            tool_call_id: None,
            tool_calls: Some(calls),
        }
    }

    /// Result of one tool call, fed back to the provider.
    pub fn tool_result(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Tool,
            content: Some(content.into()),
            tool_call_id: Some(call_id.into()),
            tool_calls: None,
        }
    }
}

/// A tool call made by the assistant, in `OpenAI` wire shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub call_type: String,
    pub function: ToolCallFunction,
}

/// Function details in a tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallFunction {
    pub name: String,
    /// Arguments as a JSON string.
    pub arguments: String,
}

impl From<&ToolCallRequest> for ToolCall {
    fn from(req: &ToolCallRequest) -> Self {
        Self {
            id: req.id.clone(),
            call_type: "function".to_string(),
            function: ToolCallFunction {
                name: req.name.clone(),
                arguments: req.arguments.to_string(),
            },
        }
    }
}

/// A tool offered to the provider.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolSpec {
    /// Namespaced function name (`server__tool`).
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Everything a provider needs for one turn.
#[derive(Debug, Clone)]
pub struct DecisionRequest {
    pub correlation_id: String,
    pub agent: String,
    pub messages: Vec<Message>,
    pub tools: Vec<ToolSpec>,
    /// Agents this agent may hand off to.
    pub handoff_targets: Vec<String>,
}

/// A tool the provider wants called.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallRequest {
    pub id: String,
    /// Namespaced function name (`server__tool`).
    pub name: String,
    pub arguments: serde_json::Value,
}

/// Incremental output of one provider turn.
#[derive(Debug, Clone, PartialEq)]
pub enum DecisionDelta {
    /// Text fragment of the answer.
    Text(String),
    /// A fully assembled tool call.
    ToolCall(ToolCallRequest),
    /// Pass control to another agent.
    Handoff { agent: String, reason: Option<String> },
    /// End of turn.
    Done,
}

pub type DecisionStream = Pin<Box<dyn Stream<Item = Result<DecisionDelta, ProviderError>> + Send>>;

/// One model turn as a stream of [`DecisionDelta`]s.
#[async_trait::async_trait]
pub trait DecisionProvider: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &str;

    async fn stream(&self, req: DecisionRequest) -> Result<DecisionStream, ProviderError>;
}

/// Used when no model endpoint is configured; every turn fails.
#[derive(Debug, Clone, Default)]
pub struct UnconfiguredProvider;

#[async_trait::async_trait]
impl DecisionProvider for UnconfiguredProvider {
    fn name(&self) -> &str {
        "unconfigured"
    }

    async fn stream(&self, _req: DecisionRequest) -> Result<DecisionStream, ProviderError> {
        Err(ProviderError::NotConfigured)
    }
}

/// Decision providers by reference name, as agents name them.
#[derive(Debug, Clone, Default)]
pub struct ProviderSet {
    providers: HashMap<String, Arc<dyn DecisionProvider>>,
}

impl ProviderSet {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, name: impl Into<String>, provider: Arc<dyn DecisionProvider>) -> Self {
        self.providers.insert(name.into(), provider);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn DecisionProvider>> {
        self.providers.get(name).cloned()
    }

    /// Build the `default` provider from optional settings.
    pub fn from_settings(primary: Option<&LlmSettings>, fallback: Option<&LlmSettings>) -> Self {
        let provider: Arc<dyn DecisionProvider> = match (primary, fallback) {
            (None, _) => Arc::new(UnconfiguredProvider),
            (Some(p), None) => Arc::new(ChatCompletionsProvider::new(p.clone())),
            (Some(p), Some(f)) => Arc::new(FallbackProvider::new(
                Arc::new(ChatCompletionsProvider::new(p.clone())),
                Arc::new(ChatCompletionsProvider::new(f.clone())),
            )),
        };
        Self::new().with("default", provider)
    }
}
