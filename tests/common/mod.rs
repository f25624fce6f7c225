//! Shared fixtures: an in-process tool server and a scripted decision provider.

#![allow(dead_code)]

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
    time::Duration,
};

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use mcp_orchestrator::{
    agents::{AgentSpec, router::KeywordRouter},
    config::AppConfig,
    defaults,
    error::ProviderError,
    events::WorkflowEvent,
    llm::{DecisionDelta, DecisionProvider, DecisionRequest, DecisionStream, ProviderSet, ToolCallRequest},
    mcp::{DiscoveryService, ToolServerClient, ToolServerDefinition, ToolServerRegistry, TransportKind, TransportRouter},
    workflow::{EngineSettings, WorkflowEngine},
};
use serde_json::{Value, json};
use tokio::sync::mpsc;

#[derive(Clone)]
struct ToolServerState {
    list_delay: Duration,
}

/// Start a plain-HTTP tool server on an ephemeral port and return its base URL.
///
/// Tools: `ping` returns `{"status":"pong"}`, `slow` sleeps for 30s,
/// `fail` answers with a business error.
pub async fn spawn_tool_server() -> String {
    spawn_tool_server_with_delay(Duration::ZERO).await
}

/// Same as [`spawn_tool_server`], with the tool listing delayed by `list_delay`.
pub async fn spawn_tool_server_with_delay(list_delay: Duration) -> String {
    let app = Router::new()
        .route("/tools", get(list_tools))
        .route("/call", post(call_tool))
        .with_state(ToolServerState { list_delay });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock tool server");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{addr}")
}

/// A URL nothing listens on.
pub async fn unreachable_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind probe");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);
    format!("http://{addr}")
}

async fn list_tools(State(state): State<ToolServerState>) -> Json<Value> {
    if !state.list_delay.is_zero() {
        tokio::time::sleep(state.list_delay).await;
    }
    Json(json!({
        "tools": [
            { "name": "ping", "description": "Replies pong", "inputSchema": { "type": "object", "properties": {} } },
            { "name": "slow", "description": "Never finishes in time" },
            { "name": "fail", "description": "Always reports invalid input" }
        ]
    }))
}

async fn call_tool(Json(body): Json<Value>) -> Response {
    match body["name"].as_str() {
        Some("ping") => Json(json!({ "status": "pong" })).into_response(),
        Some("slow") => {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Json(json!({ "status": "late" })).into_response()
        }
        Some("fail") => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": { "message": "invalid input", "field": "destination" } })),
        )
            .into_response(),
        _ => (StatusCode::NOT_FOUND, Json(json!({ "error": "unknown tool" }))).into_response(),
    }
}

/// Plays back one scripted turn per provider call and records every request.
#[derive(Debug, Default)]
pub struct ScriptedProvider {
    turns: Mutex<VecDeque<Vec<DecisionDelta>>>,
    requests: Mutex<Vec<DecisionRequest>>,
}

impl ScriptedProvider {
    pub fn new(turns: Vec<Vec<DecisionDelta>>) -> Arc<Self> {
        Arc::new(Self {
            turns: Mutex::new(turns.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<DecisionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl DecisionProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn stream(&self, req: DecisionRequest) -> Result<DecisionStream, ProviderError> {
        self.requests.lock().unwrap().push(req);
        let turn = self
            .turns
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| vec![DecisionDelta::Text("no more script".into())]);
        Ok(Box::pin(futures::stream::iter(
            turn.into_iter().map(Ok::<_, ProviderError>),
        )))
    }
}

pub fn tool_call(id: &str, function: &str) -> DecisionDelta {
    DecisionDelta::ToolCall(ToolCallRequest {
        id: id.into(),
        name: function.into(),
        arguments: json!({}),
    })
}

pub fn text(t: &str) -> DecisionDelta {
    DecisionDelta::Text(t.into())
}

pub fn server(id: &str, url: &str) -> ToolServerDefinition {
    ToolServerDefinition::new(id, url, TransportKind::Http)
}

pub fn settings() -> EngineSettings {
    EngineSettings {
        max_tool_iterations: 5,
        invocation_timeout: Duration::from_secs(5),
        provider_timeout: Duration::from_secs(5),
        cancellation_grace: Duration::from_millis(500),
        event_buffer: 64,
    }
}

/// Engine over real HTTP transports with the given provider and roster.
pub fn engine(
    servers: Vec<ToolServerDefinition>,
    provider: Arc<dyn DecisionProvider>,
    agents: Vec<AgentSpec>,
    settings: EngineSettings,
) -> WorkflowEngine {
    let registry = ToolServerRegistry::new(servers).expect("registry");
    let client: Arc<dyn ToolServerClient> = Arc::new(TransportRouter::default());
    let discovery = DiscoveryService::new(
        client,
        Duration::ZERO,
        Duration::from_secs(2),
        Duration::from_secs(3),
    );
    WorkflowEngine::new(
        registry,
        discovery,
        ProviderSet::new().with("default", provider),
        agents,
        Arc::new(KeywordRouter::new(
            defaults::routing_rules(),
            defaults::DEFAULT_AGENT,
        )),
        settings,
    )
}

/// Engine with the built-in roster and routing rules.
pub fn default_engine(
    servers: Vec<ToolServerDefinition>,
    provider: Arc<dyn DecisionProvider>,
) -> WorkflowEngine {
    engine(servers, provider, defaults::agents(), settings())
}

/// Drain `rx`, failing the test if the stream stalls.
pub async fn collect(mut rx: mpsc::Receiver<WorkflowEvent>) -> Vec<WorkflowEvent> {
    let mut events = Vec::new();
    loop {
        match tokio::time::timeout(Duration::from_secs(10), rx.recv()).await {
            Ok(Some(ev)) => events.push(ev),
            Ok(None) => return events,
            Err(_) => panic!("event stream stalled after {} events", events.len()),
        }
    }
}

/// Configuration with defaults and the given tool servers.
pub fn config(servers: &[ToolServerDefinition]) -> AppConfig {
    let servers: Vec<Value> = servers
        .iter()
        .map(|s| json!({ "id": s.id, "name": s.display_name, "url": s.base_url, "type": "http" }))
        .collect();
    serde_json::from_value(json!({
        "server": { "host": "127.0.0.1", "port": 0 },
        "timeouts": {
            "discovery_ms": 2000,
            "discovery_budget_ms": 3000,
            "invocation_ms": 5000,
            "provider_ms": 5000,
            "cancellation_grace_ms": 500
        },
        "workflow": { "max_tool_iterations": 5, "event_buffer": 64, "default_agent": "TriageAgent" },
        "discovery": { "cache_ttl_secs": 0 },
        "tool_servers": servers
    }))
    .expect("test config")
}
