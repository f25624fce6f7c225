//! MCP streamable-HTTP tool servers, via the `rmcp` client.
//!
//! Each operation opens a fresh session and closes it afterwards, so a server
//! restart never leaves a stale handle behind.

use async_trait::async_trait;
use rmcp::{
    model::CallToolRequestParam,
    service::{RoleClient, RunningService, ServiceError, ServiceExt},
    transport::{
        StreamableHttpClientTransport,
        streamable_http_client::StreamableHttpClientTransportConfig,
    },
};

use super::client::{ToolServerClient, TransportError};
use super::config::ToolServerDefinition;
use super::types::{CallToolResult, ToolDescriptor};

#[derive(Debug, Clone, Default)]
pub struct StreamableToolClient;

impl StreamableToolClient {
    pub fn new() -> Self {
        Self
    }

    async fn connect(
        server: &ToolServerDefinition,
    ) -> Result<RunningService<RoleClient, ()>, TransportError> {
        let mut config = StreamableHttpClientTransportConfig::with_uri(server.base_url.clone());
        if let Some(token) = &server.credential {
            config = config.auth_header(token.clone());
        }
        let transport = StreamableHttpClientTransport::from_config(config);

        ().serve(transport).await.map_err(|e| {
            TransportError::Unreachable(format!(
                "failed to connect MCP server '{}': {e}",
                server.id
            ))
        })
    }
}

/// Split rmcp failures: a JSON-RPC error or an unexpected reply came from a
/// server that answered; everything else never got an answer.
fn classify(e: ServiceError, context: &str) -> TransportError {
    match e {
        ServiceError::McpError(err) => TransportError::Tool {
            message: format!("{context}: {}", err.message),
            details: serde_json::to_value(&err).ok(),
        },
        ServiceError::UnexpectedResponse => TransportError::Tool {
            message: format!("{context}: unexpected response"),
            details: None,
        },
        other => TransportError::Unreachable(format!("{context}: {other}")),
    }
}

/// Turn a `tools/call` reply into a value or a tool error.
fn interpret_call_result(raw: serde_json::Value) -> Result<serde_json::Value, TransportError> {
    let result: CallToolResult = match serde_json::from_value(raw.clone()) {
        Ok(result) => result,
        Err(e) => {
            return Err(TransportError::Tool {
                message: format!("malformed tool result: {e}"),
                details: Some(raw),
            });
        }
    };

    if result.is_error == Some(true) {
        return Err(TransportError::Tool {
            message: result.error_message(),
            details: Some(raw),
        });
    }
    Ok(result.into_value())
}

#[async_trait]
impl ToolServerClient for StreamableToolClient {
    async fn list_tools(
        &self,
        server: &ToolServerDefinition,
    ) -> Result<Vec<ToolDescriptor>, TransportError> {
        let svc = Self::connect(server).await?;
        let listed = svc.list_all_tools().await;
        let _ = svc.cancel().await;

        let tools =
            listed.map_err(|e| classify(e, &format!("tools/list failed for '{}'", server.id)))?;

        Ok(tools
            .into_iter()
            .map(|t| ToolDescriptor {
                name: t.name.to_string(),
                description: t.description.as_deref().unwrap_or("").to_string(),
                input_schema: serde_json::to_value(&*t.input_schema)
                    .unwrap_or_else(|_| serde_json::json!({"type": "object", "properties": {}})),
            })
            .collect())
    }

    async fn call_tool(
        &self,
        server: &ToolServerDefinition,
        tool: &str,
        arguments: serde_json::Value,
    ) -> Result<serde_json::Value, TransportError> {
        let svc = Self::connect(server).await?;
        let called = svc
            .call_tool(CallToolRequestParam {
                name: tool.to_string().into(),
                arguments: arguments.as_object().cloned(),
            })
            .await;
        let _ = svc.cancel().await;

        let res = called
            .map_err(|e| classify(e, &format!("tools/call failed for {}::{tool}", server.id)))?;

        let raw = serde_json::to_value(&res).map_err(|e| TransportError::Tool {
            message: format!("malformed tool result: {e}"),
            details: None,
        })?;
        interpret_call_result(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rmcp::model::ErrorData;

    #[test]
    fn test_json_rpc_error_is_tool_error() {
        let e = ServiceError::McpError(ErrorData::invalid_params(
            "unknown tool: nope",
            Some(serde_json::json!({"tool": "nope"})),
        ));
        match classify(e, "tools/call failed for echo::nope") {
            TransportError::Tool { message, details } => {
                assert!(message.contains("unknown tool: nope"));
                assert_eq!(details.unwrap()["data"]["tool"], "nope");
            }
            other => panic!("expected tool error, got {other:?}"),
        }
    }

    #[test]
    fn test_unexpected_response_is_tool_error() {
        let err = classify(ServiceError::UnexpectedResponse, "tools/call");
        assert!(matches!(err, TransportError::Tool { .. }));
    }

    #[test]
    fn test_closed_transport_is_unreachable() {
        let err = classify(ServiceError::TransportClosed, "tools/call");
        assert!(matches!(err, TransportError::Unreachable(_)));
    }

    #[test]
    fn test_malformed_result_is_tool_error() {
        let raw = serde_json::json!({"content": "not a list"});
        let err = interpret_call_result(raw.clone()).unwrap_err();
        match err {
            TransportError::Tool { message, details } => {
                assert!(message.starts_with("malformed tool result"));
                assert_eq!(details, Some(raw));
            }
            other => panic!("expected tool error, got {other:?}"),
        }
    }

    #[test]
    fn test_is_error_result_is_tool_error() {
        let raw = serde_json::json!({
            "content": [{"type": "text", "text": "city not found"}],
            "isError": true
        });
        let err = interpret_call_result(raw).unwrap_err();
        assert_eq!(err.to_string(), "city not found");
    }

    #[test]
    fn test_structured_result_passes_through() {
        let raw = serde_json::json!({
            "content": [{"type": "text", "text": "{\"status\":\"pong\"}"}],
            "isError": false
        });
        assert_eq!(
            interpret_call_result(raw).unwrap(),
            serde_json::json!({"status": "pong"})
        );
    }
}
