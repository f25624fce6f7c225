use serde::{Deserialize, Serialize};

use super::config::ToolServerDefinition;

/// A tool advertised by a tool server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "inputSchema", alias = "input_schema", default = "empty_schema")]
    pub input_schema: serde_json::Value,
}

fn empty_schema() -> serde_json::Value {
    serde_json::json!({ "type": "object", "properties": {} })
}

impl ToolDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema: empty_schema(),
        }
    }

    #[must_use]
    pub fn with_schema(mut self, schema: serde_json::Value) -> Self {
        self.input_schema = schema;
        self
    }
}

/// Outcome of asking one server for its tools.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryResult {
    pub server_id: String,
    pub reachable: bool,
    pub tools: Vec<ToolDescriptor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DiscoveryResult {
    pub fn reachable(server_id: impl Into<String>, tools: Vec<ToolDescriptor>) -> Self {
        Self {
            server_id: server_id.into(),
            reachable: true,
            tools,
            error: None,
        }
    }

    pub fn unreachable(server_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            server_id: server_id.into(),
            reachable: false,
            tools: Vec::new(),
            error: Some(error.into()),
        }
    }
}

/// Lookup key for a bound tool: `(server id, tool name)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ToolKey {
    pub server_id: String,
    pub tool_name: String,
}

impl ToolKey {
    pub fn new(server_id: impl Into<String>, tool_name: impl Into<String>) -> Self {
        Self {
            server_id: server_id.into(),
            tool_name: tool_name.into(),
        }
    }

    /// Function name presented to decision providers: `server__tool`.
    ///
    /// OpenAI requires `^[a-zA-Z0-9_-]+$`, so anything else becomes `_`.
    pub fn function_name(&self) -> String {
        sanitize_tool_name(&format!("{}__{}", self.server_id, self.tool_name))
    }
}

impl std::fmt::Display for ToolKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}::{}", self.server_id, self.tool_name)
    }
}

pub(crate) fn sanitize_tool_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Entry of the `GET /api/tools` listing.
#[derive(Debug, Clone, Serialize)]
pub struct ServerToolListing {
    pub id: String,
    pub name: String,
    pub url: String,
    #[serde(rename = "type")]
    pub transport: &'static str,
    pub reachable: bool,
    pub tools: Vec<ToolDescriptor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ServerToolListing {
    pub fn from_result(server: &ToolServerDefinition, result: &DiscoveryResult) -> Self {
        Self {
            id: server.id.clone(),
            name: server.display_name.clone(),
            url: server.base_url.clone(),
            transport: server.transport.as_str(),
            reachable: result.reachable,
            tools: result.tools.clone(),
            error: result.error.clone(),
        }
    }
}

/// `tools/list` body as served by plain HTTP tool servers: a bare array or `{ "tools": [...] }`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ListToolsResponse {
    Bare(Vec<ToolDescriptor>),
    Wrapped { tools: Vec<ToolDescriptor> },
}

impl ListToolsResponse {
    pub fn into_tools(self) -> Vec<ToolDescriptor> {
        match self {
            Self::Bare(tools) | Self::Wrapped { tools } => tools,
        }
    }
}

/// MCP-shaped `tools/call` result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallToolResult {
    #[serde(default)]
    pub content: Vec<serde_json::Value>,
    #[serde(rename = "isError", default)]
    pub is_error: Option<bool>,
    #[serde(rename = "structuredContent", default)]
    pub structured_content: Option<serde_json::Value>,
}

impl CallToolResult {
    /// Best JSON rendering of the result: structured content, else the single
    /// text part parsed as JSON, else the raw content list.
    pub fn into_value(self) -> serde_json::Value {
        if let Some(structured) = self.structured_content {
            return structured;
        }
        if let [only] = self.content.as_slice() {
            if let Some(text) = only.get("text").and_then(|t| t.as_str()) {
                return serde_json::from_str(text)
                    .unwrap_or_else(|_| serde_json::Value::String(text.to_string()));
            }
        }
        serde_json::Value::Array(self.content)
    }

    /// Text summary used as the error message of a failed call.
    pub fn error_message(&self) -> String {
        let text: Vec<&str> = self
            .content
            .iter()
            .filter_map(|c| c.get("text").and_then(|t| t.as_str()))
            .collect();
        if text.is_empty() {
            "tool reported an error".to_string()
        } else {
            text.join("\n")
        }
    }
}
