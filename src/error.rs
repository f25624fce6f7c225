//! Error taxonomy for discovery, invocation, routing and decision providers.
//!
//! Tool-level failures ([`ToolCallError`]) are recovered inside a workflow run
//! and handed back to the decision provider as data. Routing and provider
//! failures ([`WorkflowError`]) end the run with a single `error` event.

use std::time::Duration;

use thiserror::Error;

/// Stable wire codes carried by `error` events and failed `tool_call_end` payloads.
pub mod codes {
    pub const TOOL_SERVER_UNREACHABLE: &str = "tool_server_unreachable";
    pub const TOOL_INVOCATION_TIMEOUT: &str = "tool_invocation_timeout";
    pub const TOOL_INVOCATION_ERROR: &str = "tool_invocation_error";
    pub const AGENT_ROUTING_FAILURE: &str = "agent_routing_failure";
    pub const DECISION_PROVIDER_ERROR: &str = "decision_provider_error";
    pub const STREAM_TERMINATED_BY_CLIENT: &str = "stream_terminated_by_client";
    pub const WORKFLOW_ABORTED: &str = "workflow_aborted";
}

/// Failure of a single tool call. Never fatal to a workflow run.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ToolCallError {
    /// Transport-level failure: refused connection, DNS, broken protocol.
    #[error("tool server '{server_id}' unreachable: {message}")]
    Unreachable { server_id: String, message: String },

    /// The call did not finish within the invocation timeout.
    #[error("tool '{tool}' on '{server_id}' timed out after {}ms", .after.as_millis())]
    Timeout {
        server_id: String,
        tool: String,
        after: Duration,
    },

    /// The tool server answered, but with a business-level error.
    #[error("tool '{tool}' on '{server_id}' reported an error: {message}")]
    Invocation {
        server_id: String,
        tool: String,
        message: String,
        details: Option<serde_json::Value>,
    },

    /// The decision provider asked for a tool that is not bound to the agent.
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    /// The request was cancelled while the call was in flight.
    #[error("tool call cancelled")]
    Cancelled,
}

impl ToolCallError {
    /// Wire code for this failure.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unreachable { .. } => codes::TOOL_SERVER_UNREACHABLE,
            Self::Cancelled => codes::STREAM_TERMINATED_BY_CLIENT,
            Self::Timeout { .. } => codes::TOOL_INVOCATION_TIMEOUT,
            Self::Invocation { .. } | Self::UnknownTool(_) => codes::TOOL_INVOCATION_ERROR,
        }
    }

    /// JSON payload handed to the client and folded back to the decision provider.
    pub fn to_payload(&self) -> serde_json::Value {
        let mut payload = serde_json::json!({
            "code": self.code(),
            "message": self.to_string(),
        });
        if let Self::Invocation {
            details: Some(details),
            ..
        } = self
        {
            payload["details"] = details.clone();
        }
        payload
    }
}

/// Routing and hand-off protocol violations. Fatal to the request.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RoutingFailure {
    #[error("no agent available")]
    NoAgentAvailable,

    #[error("duplicate handoff to '{agent}'")]
    DuplicateHandoff { agent: String },

    #[error("unknown agent '{agent}'")]
    UnknownAgent { agent: String },

    #[error("'{from}' may not hand off to '{to}'")]
    UndeclaredHandoff { from: String, to: String },

    #[error("maximum tool iterations ({limit}) exceeded")]
    MaxIterationsExceeded { limit: usize },
}

/// The external decision provider failed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    #[error("decision provider not configured")]
    NotConfigured,

    #[error("decision provider request failed: {0}")]
    Request(String),

    #[error("decision provider returned malformed output: {0}")]
    Malformed(String),

    #[error("decision provider timed out after {}ms", .0.as_millis())]
    Timeout(Duration),
}

/// Agent roster construction failed. These are programming/configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BindError {
    #[error("agent '{0}' is defined more than once")]
    DuplicateAgent(String),

    #[error("agent '{agent}' references unknown decision provider '{provider}'")]
    UnknownProvider { agent: String, provider: String },
}

/// Terminal failure of a workflow run.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("AgentRoutingFailure: {0}")]
    Routing(#[from] RoutingFailure),

    #[error("DecisionProviderError: {0}")]
    Provider(#[from] ProviderError),

    #[error("AgentRoutingFailure: {0}")]
    Bind(#[from] BindError),

    #[error("StreamTerminatedByClient")]
    Cancelled,
}

impl WorkflowError {
    /// Wire code for this failure.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Routing(_) | Self::Bind(_) => codes::AGENT_ROUTING_FAILURE,
            Self::Provider(_) => codes::DECISION_PROVIDER_ERROR,
            Self::Cancelled => codes::STREAM_TERMINATED_BY_CLIENT,
        }
    }
}
