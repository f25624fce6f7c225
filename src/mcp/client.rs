//! Transport seam for talking to tool servers.

use std::sync::Arc;

use async_trait::async_trait;

use super::config::{ToolServerDefinition, TransportKind};
use super::http::HttpToolClient;
use super::streamable::StreamableToolClient;
use super::types::ToolDescriptor;

/// Raw transport failure, before timeouts and cancellation are layered on.
#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum TransportError {
    /// Could not reach the server or the protocol broke down.
    #[error("{0}")]
    Unreachable(String),
    /// The server answered with a tool-level error.
    #[error("{message}")]
    Tool {
        message: String,
        details: Option<serde_json::Value>,
    },
}

/// A way of talking to a tool server. One call is one logical operation; no retries.
#[async_trait]
pub trait ToolServerClient: Send + Sync + std::fmt::Debug {
    async fn list_tools(
        &self,
        server: &ToolServerDefinition,
    ) -> Result<Vec<ToolDescriptor>, TransportError>;

    async fn call_tool(
        &self,
        server: &ToolServerDefinition,
        tool: &str,
        arguments: serde_json::Value,
    ) -> Result<serde_json::Value, TransportError>;
}

/// Dispatches to the client matching each server's [`TransportKind`].
#[derive(Debug, Clone)]
pub struct TransportRouter {
    http: Arc<dyn ToolServerClient>,
    streaming: Arc<dyn ToolServerClient>,
}

impl TransportRouter {
    pub fn new(http: Arc<dyn ToolServerClient>, streaming: Arc<dyn ToolServerClient>) -> Self {
        Self { http, streaming }
    }

    fn pick(&self, server: &ToolServerDefinition) -> &Arc<dyn ToolServerClient> {
        match server.transport {
            TransportKind::Http => &self.http,
            TransportKind::HttpStreaming => &self.streaming,
        }
    }
}

impl Default for TransportRouter {
    fn default() -> Self {
        Self::new(
            Arc::new(HttpToolClient::new()),
            Arc::new(StreamableToolClient::new()),
        )
    }
}

#[async_trait]
impl ToolServerClient for TransportRouter {
    async fn list_tools(
        &self,
        server: &ToolServerDefinition,
    ) -> Result<Vec<ToolDescriptor>, TransportError> {
        self.pick(server).list_tools(server).await
    }

    async fn call_tool(
        &self,
        server: &ToolServerDefinition,
        tool: &str,
        arguments: serde_json::Value,
    ) -> Result<serde_json::Value, TransportError> {
        self.pick(server).call_tool(server, tool, arguments).await
    }
}
