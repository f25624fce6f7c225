//! Tool invocation: one call, one timeout, no retries.

use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use super::client::{ToolServerClient, TransportError};
use super::config::ToolServerDefinition;
use crate::error::ToolCallError;

/// Invoke `tool` on `server`.
///
/// Tool calls may not be idempotent, so a failure is reported as-is and any
/// retry is left to the caller.
pub async fn invoke(
    client: &dyn ToolServerClient,
    server: &ToolServerDefinition,
    tool: &str,
    arguments: serde_json::Value,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<serde_json::Value, ToolCallError> {
    let started = Instant::now();

    let outcome = tokio::select! {
        () = cancel.cancelled() => Err(ToolCallError::Cancelled),
        res = tokio::time::timeout(timeout, client.call_tool(server, tool, arguments)) => match res {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(TransportError::Unreachable(message))) => Err(ToolCallError::Unreachable {
                server_id: server.id.clone(),
                message,
            }),
            Ok(Err(TransportError::Tool { message, details })) => Err(ToolCallError::Invocation {
                server_id: server.id.clone(),
                tool: tool.to_string(),
                message,
                details,
            }),
            Err(_) => Err(ToolCallError::Timeout {
                server_id: server.id.clone(),
                tool: tool.to_string(),
                after: timeout,
            }),
        },
    };

    let elapsed = started.elapsed();
    let outcome_label = match &outcome {
        Ok(_) => "ok",
        Err(e) => e.code(),
    };
    metrics::counter!(
        "orchestrator_tool_calls_total",
        "server" => server.id.clone(),
        "outcome" => outcome_label
    )
    .increment(1);
    metrics::histogram!("orchestrator_tool_call_duration_seconds").record(elapsed.as_secs_f64());

    match &outcome {
        Ok(_) => tracing::info!(
            server_id = %server.id,
            tool = %tool,
            elapsed_ms = elapsed.as_millis() as u64,
            "Tool call succeeded"
        ),
        Err(e) => tracing::warn!(
            server_id = %server.id,
            tool = %tool,
            elapsed_ms = elapsed.as_millis() as u64,
            error = %e,
            "Tool call failed"
        ),
    }

    outcome
}
