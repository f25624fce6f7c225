//! Plain JSON-over-HTTP tool servers.
//!
//! - `GET {url}/tools` returns the tool list
//! - `POST {url}/call` with `{ "name", "arguments" }` runs a tool

use async_trait::async_trait;
use reqwest::StatusCode;

use super::client::{ToolServerClient, TransportError};
use super::config::ToolServerDefinition;
use super::types::{CallToolResult, ListToolsResponse, ToolDescriptor};

#[derive(Debug, Clone, Default)]
pub struct HttpToolClient {
    http: reqwest::Client,
}

impl HttpToolClient {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }

    fn endpoint(server: &ToolServerDefinition, path: &str) -> String {
        format!("{}/{path}", server.base_url.trim_end_matches('/'))
    }

    fn authorize(
        rb: reqwest::RequestBuilder,
        server: &ToolServerDefinition,
    ) -> reqwest::RequestBuilder {
        match &server.credential {
            Some(token) => rb.bearer_auth(token),
            None => rb,
        }
    }
}

/// Gateway-style statuses mean the tool server itself was not reached.
fn is_transport_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT
    )
}

/// A 2xx body that does not have the expected shape. The server answered,
/// so this is a tool error, not a transport failure.
fn malformed(body: serde_json::Value, e: &serde_json::Error) -> TransportError {
    TransportError::Tool {
        message: format!("malformed tool result: {e}"),
        details: Some(body),
    }
}

/// Interpret a successful `/call` body.
fn interpret_call_body(body: serde_json::Value) -> Result<serde_json::Value, TransportError> {
    if body.get("isError").and_then(serde_json::Value::as_bool) == Some(true) {
        let message = match serde_json::from_value::<CallToolResult>(body.clone()) {
            Ok(res) => res.error_message(),
            Err(_) => body
                .get("content")
                .filter(|c| !c.is_null())
                .map_or_else(|| "tool reported an error".to_string(), error_text),
        };
        return Err(TransportError::Tool {
            message,
            details: Some(body),
        });
    }

    if let Some(err) = body.get("error").filter(|e| !e.is_null()) {
        return Err(TransportError::Tool {
            message: error_text(err),
            details: Some(err.clone()),
        });
    }

    if body.get("content").is_some_and(serde_json::Value::is_array) {
        return match serde_json::from_value::<CallToolResult>(body.clone()) {
            Ok(res) => Ok(res.into_value()),
            Err(e) => Err(malformed(body, &e)),
        };
    }

    Ok(body)
}

fn error_text(err: &serde_json::Value) -> String {
    match err {
        serde_json::Value::String(s) => s.clone(),
        other => other
            .get("message")
            .and_then(|m| m.as_str())
            .map_or_else(|| other.to_string(), ToString::to_string),
    }
}

#[async_trait]
impl ToolServerClient for HttpToolClient {
    async fn list_tools(
        &self,
        server: &ToolServerDefinition,
    ) -> Result<Vec<ToolDescriptor>, TransportError> {
        let url = Self::endpoint(server, "tools");
        tracing::debug!(server_id = %server.id, url = %url, "Listing tools");

        let resp = Self::authorize(self.http.get(&url), server)
            .send()
            .await
            .map_err(|e| TransportError::Unreachable(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(TransportError::Unreachable(format!(
                "tools listing returned HTTP {status}"
            )));
        }

        let listing: ListToolsResponse = resp
            .json()
            .await
            .map_err(|e| TransportError::Unreachable(format!("malformed tools listing: {e}")))?;
        Ok(listing.into_tools())
    }

    async fn call_tool(
        &self,
        server: &ToolServerDefinition,
        tool: &str,
        arguments: serde_json::Value,
    ) -> Result<serde_json::Value, TransportError> {
        let url = Self::endpoint(server, "call");
        let payload = serde_json::json!({ "name": tool, "arguments": arguments });

        tracing::debug!(server_id = %server.id, tool = %tool, url = %url, "Calling tool");

        let resp = Self::authorize(self.http.post(&url).json(&payload), server)
            .send()
            .await
            .map_err(|e| TransportError::Unreachable(e.to_string()))?;

        let status = resp.status();
        if is_transport_status(status) {
            return Err(TransportError::Unreachable(format!(
                "tool server returned HTTP {status}"
            )));
        }

        let text = resp
            .text()
            .await
            .map_err(|e| TransportError::Unreachable(e.to_string()))?;
        let body: Option<serde_json::Value> = serde_json::from_str(&text).ok();

        if !status.is_success() {
            let details = body.clone();
            let message = body
                .as_ref()
                .and_then(|b| b.get("error"))
                .map_or_else(|| format!("HTTP {status}: {text}"), error_text);
            return Err(TransportError::Tool { message, details });
        }

        match body {
            Some(body) => interpret_call_body(body),
            None => Err(TransportError::Tool {
                message: "tool server returned a non-JSON body".to_string(),
                details: Some(serde_json::Value::String(text)),
            }),
        }
    }
}
