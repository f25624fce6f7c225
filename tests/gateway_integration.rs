mod common;

use std::sync::Arc;

use axum::http::{HeaderValue, StatusCode, header};
use axum_test::TestServer;
use common::{ScriptedProvider, config, engine, server, settings, spawn_tool_server, text, tool_call, unreachable_url};
use mcp_orchestrator::{
    AppState,
    agents::AgentSpec,
    defaults,
    error::codes,
    events::WorkflowEvent,
    gateway,
    llm::{DecisionDelta, DecisionProvider, UnconfiguredProvider},
    mcp::ToolServerDefinition,
};
use serde_json::{Value, json};

fn test_server(
    servers: Vec<ToolServerDefinition>,
    provider: Arc<dyn DecisionProvider>,
    agents: Vec<AgentSpec>,
) -> TestServer {
    let state = AppState {
        config: Arc::new(config(&servers)),
        engine: engine(servers, provider, agents, settings()),
        metrics: None,
    };
    TestServer::new(gateway::router(state)).unwrap()
}

fn parse_ndjson(body: &str) -> Vec<WorkflowEvent> {
    body.lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| serde_json::from_str(l).unwrap())
        .collect()
}

fn ping_script() -> Arc<ScriptedProvider> {
    ScriptedProvider::new(vec![
        vec![tool_call("call_1", "echo__ping"), DecisionDelta::Done],
        vec![text("pong"), DecisionDelta::Done],
    ])
}

#[tokio::test]
async fn test_chat_streams_ndjson() {
    let url = spawn_tool_server().await;
    let server = test_server(vec![server("echo", &url)], ping_script(), defaults::agents());

    let response = server
        .post("/api/chat")
        .json(&json!({ "message": "ping", "tools": ["echo"] }))
        .await;

    response.assert_status_ok();
    assert_eq!(response.header(header::CONTENT_TYPE), "application/x-ndjson");

    let events = parse_ndjson(&response.text());
    let kinds: Vec<_> = events.iter().map(|e| e.kind.as_str()).collect();
    assert_eq!(kinds.first(), Some(&"routing_decision"));
    assert!(kinds.contains(&"tool_call_start"));
    assert!(kinds.contains(&"tool_call_end"));
    assert_eq!(kinds.last(), Some(&"agent_complete"));

    // One correlation id per stream, exactly one terminal frame.
    let corr = &events[0].correlation_id;
    assert!(events.iter().all(|e| &e.correlation_id == corr));
    assert_eq!(events.iter().filter(|e| e.terminal).count(), 1);
}

#[tokio::test]
async fn test_chat_streams_sse_when_requested() {
    let url = spawn_tool_server().await;
    let server = test_server(vec![server("echo", &url)], ping_script(), defaults::agents());

    let response = server
        .post("/api/chat")
        .add_header(header::ACCEPT, HeaderValue::from_static("text/event-stream"))
        .json(&json!({ "message": "ping" }))
        .await;

    response.assert_status_ok();
    let content_type = response.header(header::CONTENT_TYPE);
    assert!(content_type.to_str().unwrap().starts_with("text/event-stream"));

    let body = response.text();
    assert!(body.contains("event: routing_decision"));
    assert!(body.contains("event: tool_call_end"));
    assert!(body.contains("event: agent_complete"));
    assert!(body.contains("id: 0"));
}

#[tokio::test]
async fn test_empty_message_rejected() {
    let server = test_server(Vec::new(), Arc::new(UnconfiguredProvider), defaults::agents());

    let response = server
        .post("/api/chat")
        .json(&json!({ "message": "   " }))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_routing_failure_before_stream_is_422() {
    let server = test_server(Vec::new(), ScriptedProvider::new(Vec::new()), Vec::new());

    let response = server
        .post("/api/chat")
        .json(&json!({ "message": "hello" }))
        .await;

    response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    let event: WorkflowEvent = response.json();
    assert!(event.terminal);
    assert_eq!(event.error_code(), Some(codes::AGENT_ROUTING_FAILURE));
}

#[tokio::test]
async fn test_provider_failure_ends_stream_with_error_frame() {
    let down = unreachable_url().await;
    let server = test_server(
        vec![server("down", &down)],
        Arc::new(UnconfiguredProvider),
        defaults::agents(),
    );

    let response = server
        .post("/api/chat")
        .json(&json!({ "message": "hello" }))
        .await;

    // Routing already streamed, so the failure arrives as the terminal frame.
    response.assert_status_ok();
    let events = parse_ndjson(&response.text());
    let last = events.last().unwrap();
    assert!(last.terminal);
    assert_eq!(last.error_code(), Some(codes::DECISION_PROVIDER_ERROR));
}

#[tokio::test]
async fn test_tools_listing_reports_unreachable_servers() {
    let up = spawn_tool_server().await;
    let down = unreachable_url().await;
    let server = test_server(
        vec![server("echo", &up), server("down", &down), server("other", &down)],
        Arc::new(UnconfiguredProvider),
        defaults::agents(),
    );

    let response = server
        .get("/api/tools")
        .add_query_param("tools", "echo,down")
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    let listing = body["tools"].as_array().unwrap();
    assert_eq!(listing.len(), 2);

    assert_eq!(listing[0]["id"], "echo");
    assert_eq!(listing[0]["reachable"], true);
    assert_eq!(listing[0]["tools"].as_array().unwrap().len(), 3);

    assert_eq!(listing[1]["id"], "down");
    assert_eq!(listing[1]["reachable"], false);
    assert!(listing[1]["error"].is_string());
}

#[tokio::test]
async fn test_health() {
    let server = test_server(
        vec![server("echo", "http://localhost:1")],
        Arc::new(UnconfiguredProvider),
        defaults::agents(),
    );

    let response = server.get("/api/health").await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["status"], "OK");
    assert_eq!(body["service"], "mcp-orchestrator");
    assert_eq!(body["tool_servers"]["total"], 1);
    assert_eq!(body["tool_servers"]["configured"][0], "echo");
}

#[tokio::test]
async fn test_metrics_without_recorder_is_404() {
    let server = test_server(Vec::new(), Arc::new(UnconfiguredProvider), defaults::agents());

    server.get("/metrics").await.assert_status(StatusCode::NOT_FOUND);
}
