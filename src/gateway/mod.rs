//! Streaming gateway: the HTTP surface of the orchestrator.
//!
//! | Route | Purpose |
//! |---|---|
//! | `POST /api/chat` | run a workflow, streaming NDJSON (or SSE with `Accept: text/event-stream`) |
//! | `GET /api/tools` | discovery listing for an allow-list (`?tools=a,b`) |
//! | `GET /api/health` | liveness |
//! | `GET /metrics` | Prometheus exposition |

pub mod stream;

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::AppState;
use crate::error::codes;
use crate::events::{EventKind, WorkflowEvent};
use crate::mcp::ServerToolListing;
use crate::workflow::RequestContext;

/// Request body limit for the API.
pub const BODY_LIMIT: usize = 1024 * 1024;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/chat", post(api_chat))
        .route("/api/tools", get(api_tools))
        .route("/api/health", get(api_health))
        .route("/metrics", get(metrics_handler))
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    /// Allowed tool-server ids; absent means all configured servers.
    #[serde(default)]
    pub tools: Option<Vec<String>>,
}

/// POST /api/chat - Run one workflow and stream its events.
async fn api_chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ChatRequest>,
) -> Response {
    if req.message.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": "message must not be empty" })),
        )
            .into_response();
    }

    let ctx = RequestContext::new(req.message, req.tools);
    let correlation_id = ctx.correlation_id.clone();
    info!(
        name: "chat.request",
        correlation_id = %correlation_id,
        allowed = ?ctx.allowed_tool_server_ids,
        "Chat request received"
    );

    let guard = ctx.cancel.clone().drop_guard();
    let mut rx = state.engine.spawn(ctx);

    // Failures before the first frame get a proper status code instead of a stream.
    let Some(first) = rx.recv().await else {
        tracing::error!(correlation_id = %correlation_id, "Workflow produced no events");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": "workflow produced no events" })),
        )
            .into_response();
    };
    if first.kind == EventKind::Error {
        let status = status_for(&first);
        tracing::warn!(
            correlation_id = %correlation_id,
            status = status.as_u16(),
            code = ?first.error_code(),
            "Workflow failed before streaming"
        );
        guard.disarm();
        return (status, Json(first)).into_response();
    }

    let events = stream::relay(first, rx, guard);
    if wants_sse(&headers) {
        stream::sse_response(events)
    } else {
        stream::ndjson_response(events)
    }
}

fn wants_sse(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("text/event-stream"))
}

fn status_for(event: &WorkflowEvent) -> StatusCode {
    match event.error_code() {
        Some(codes::AGENT_ROUTING_FAILURE) => StatusCode::UNPROCESSABLE_ENTITY,
        Some(codes::DECISION_PROVIDER_ERROR) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[derive(Debug, Deserialize)]
pub struct ToolsQuery {
    /// Comma-separated tool-server ids.
    pub tools: Option<String>,
}

/// GET /api/tools - Discovered tools per server. Unreachable servers are listed, not fatal.
async fn api_tools(State(state): State<AppState>, Query(q): Query<ToolsQuery>) -> Response {
    let allow: Option<Vec<String>> = q.tools.map(|s| {
        s.split(',')
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(ToString::to_string)
            .collect()
    });

    let registry = state.engine.registry();
    let servers = registry.select(allow.as_deref());
    let results = state
        .engine
        .discovery()
        .discover(&servers, &CancellationToken::new())
        .await;

    let listing: Vec<ServerToolListing> = servers
        .iter()
        .zip(&results)
        .map(|(server, result)| ServerToolListing::from_result(server, result))
        .collect();

    info!(
        servers = listing.len(),
        reachable = listing.iter().filter(|l| l.reachable).count(),
        "Tools listed"
    );
    Json(serde_json::json!({ "tools": listing })).into_response()
}

/// GET /api/health - Liveness, independent of any run.
async fn api_health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let registry = state.engine.registry();
    Json(serde_json::json!({
        "status": "OK",
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "tool_servers": {
            "total": registry.len(),
            "configured": registry.ids(),
        },
    }))
}

/// GET /metrics - Prometheus text exposition.
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn error_event(code: &str) -> WorkflowEvent {
        WorkflowEvent {
            seq: 0,
            kind: EventKind::Error,
            agent: None,
            correlation_id: "c".into(),
            timestamp: Utc::now(),
            terminal: true,
            payload: serde_json::json!({ "code": code, "message": "x" }),
        }
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            status_for(&error_event(codes::AGENT_ROUTING_FAILURE)),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_for(&error_event(codes::DECISION_PROVIDER_ERROR)),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_for(&error_event(codes::STREAM_TERMINATED_BY_CLIENT)),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_accept_header_selects_sse() {
        let mut headers = HeaderMap::new();
        assert!(!wants_sse(&headers));
        headers.insert(header::ACCEPT, "text/event-stream".parse().unwrap());
        assert!(wants_sse(&headers));
    }
}
