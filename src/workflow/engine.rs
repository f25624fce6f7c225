use std::{
    collections::{HashSet, VecDeque},
    sync::Arc,
    time::Duration,
};

use futures::{StreamExt, stream::FuturesUnordered};
use tokio::sync::mpsc;
use tracing::instrument;

use super::{RequestContext, WorkflowState};
use crate::agents::router::RoutingPolicy;
use crate::agents::{Agent, AgentSpec, bind};
use crate::error::{ProviderError, RoutingFailure, ToolCallError, WorkflowError};
use crate::events::{EventEmitter, WorkflowEvent};
use crate::llm::{DecisionDelta, DecisionRequest, Message, ProviderSet, ToolCall, ToolCallRequest};
use crate::mcp::{DiscoveryService, ToolServerDefinition, ToolServerRegistry, invoke};

/// Per-run limits and timeouts.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Tool-call rounds allowed per run before it fails.
    pub max_tool_iterations: usize,
    pub invocation_timeout: Duration,
    /// Bound on one decision-provider turn, from request to last delta.
    pub provider_timeout: Duration,
    /// How long a cancelled run may keep going before it is aborted.
    pub cancellation_grace: Duration,
    pub event_buffer: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_tool_iterations: 10,
            invocation_timeout: Duration::from_secs(30),
            provider_timeout: Duration::from_secs(60),
            cancellation_grace: Duration::from_secs(2),
            event_buffer: 64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Complete,
    Failed,
    Cancelled,
}

impl RunOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Complete => "complete",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Shared, read-only dependencies of every run.
#[derive(Clone)]
pub struct WorkflowEngine {
    registry: ToolServerRegistry,
    discovery: DiscoveryService,
    providers: Arc<ProviderSet>,
    agents: Arc<Vec<AgentSpec>>,
    router: Arc<dyn RoutingPolicy>,
    settings: EngineSettings,
}

impl std::fmt::Debug for WorkflowEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowEngine")
            .field("tool_servers", &self.registry.len())
            .field("agents", &self.agents.len())
            .field("router", &self.router)
            .field("settings", &self.settings)
            .finish()
    }
}

impl WorkflowEngine {
    pub fn new(
        registry: ToolServerRegistry,
        discovery: DiscoveryService,
        providers: ProviderSet,
        agents: Vec<AgentSpec>,
        router: Arc<dyn RoutingPolicy>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            registry,
            discovery,
            providers: Arc::new(providers),
            agents: Arc::new(agents),
            router,
            settings,
        }
    }

    pub fn registry(&self) -> &ToolServerRegistry {
        &self.registry
    }

    pub fn discovery(&self) -> &DiscoveryService {
        &self.discovery
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Run `ctx` on its own task and return the event receiver.
    ///
    /// Once `ctx.cancel` fires the run gets `cancellation_grace` to wind down
    /// before the task is aborted.
    pub fn spawn(&self, ctx: RequestContext) -> mpsc::Receiver<WorkflowEvent> {
        let (mut events, rx) =
            EventEmitter::channel(ctx.correlation_id.clone(), self.settings.event_buffer);
        let engine = self.clone();
        let cancel = ctx.cancel.clone();
        let grace = self.settings.cancellation_grace;
        let correlation_id = ctx.correlation_id.clone();

        let mut handle = tokio::spawn(async move {
            engine.run(&ctx, &mut events).await;
        });

        tokio::spawn(async move {
            tokio::select! {
                _ = &mut handle => {}
                () = cancel.cancelled() => {
                    if tokio::time::timeout(grace, &mut handle).await.is_err() {
                        tracing::warn!(
                            correlation_id = %correlation_id,
                            grace_ms = grace.as_millis() as u64,
                            "Workflow run ignored cancellation past the grace period, aborting"
                        );
                        handle.abort();
                    }
                }
            }
        });

        rx
    }

    /// Drive one run to its terminal event.
    #[instrument(skip_all, fields(correlation_id = %ctx.correlation_id))]
    pub async fn run(&self, ctx: &RequestContext, events: &mut EventEmitter) -> RunOutcome {
        tracing::info!(
            message_len = ctx.raw_message.len(),
            allowed = ?ctx.allowed_tool_server_ids,
            "Workflow run started"
        );

        let mut run = Run {
            engine: self,
            ctx,
            events,
            state: WorkflowState::Init,
            visited: HashSet::new(),
            iterations: 0,
            current_agent: None,
        };

        let result = run.drive().await;
        let agent = run.current_agent.clone();

        let outcome = match result {
            Ok(answer) => {
                run.transition(WorkflowState::Complete);
                let name = agent.unwrap_or_default();
                if run.events.complete(&name, &answer).await.is_err() {
                    tracing::info!("Client left before the final answer was delivered");
                }
                RunOutcome::Complete
            }
            Err(WorkflowError::Cancelled) => {
                run.transition(WorkflowState::Failed);
                tracing::info!(state = %run.state, "StreamTerminatedByClient");
                let _ = run
                    .events
                    .error(agent.as_deref(), &WorkflowError::Cancelled)
                    .await;
                RunOutcome::Cancelled
            }
            Err(e) => {
                run.transition(WorkflowState::Failed);
                tracing::warn!(agent = ?agent, code = e.code(), error = %e, "Workflow run failed");
                let _ = run.events.error(agent.as_deref(), &e).await;
                RunOutcome::Failed
            }
        };

        metrics::counter!("orchestrator_workflow_runs_total", "outcome" => outcome.as_str())
            .increment(1);
        tracing::info!(
            outcome = outcome.as_str(),
            events = run.events.emitted(),
            tool_rounds = run.iterations,
            "Workflow run finished"
        );
        outcome
    }
}

enum AgentOutcome {
    Answer(String),
    Handoff {
        target: String,
        reason: Option<String>,
        text: String,
    },
}

#[derive(Default)]
struct TurnOutput {
    text: String,
    tool_calls: Vec<ToolCallRequest>,
    handoff: Option<(String, Option<String>)>,
}

/// A tool call resolved against the agent's bound tools.
struct PlannedCall<'c> {
    call: &'c ToolCallRequest,
    server: Option<ToolServerDefinition>,
    server_id: String,
    tool: String,
}

/// Mutable state of one run.
struct Run<'a> {
    engine: &'a WorkflowEngine,
    ctx: &'a RequestContext,
    events: &'a mut EventEmitter,
    state: WorkflowState,
    visited: HashSet<String>,
    iterations: usize,
    current_agent: Option<String>,
}

impl Run<'_> {
    fn transition(&mut self, next: WorkflowState) {
        tracing::debug!(from = %self.state, to = %next, "Workflow state transition");
        self.state = next;
    }

    fn checkpoint(&self) -> Result<(), WorkflowError> {
        if self.ctx.is_cancelled() {
            Err(WorkflowError::Cancelled)
        } else {
            Ok(())
        }
    }

    async fn drive(&mut self) -> Result<String, WorkflowError> {
        let engine = self.engine;
        let ctx = self.ctx;

        self.checkpoint()?;
        let servers = engine.registry.select(ctx.allowed_tool_server_ids.as_deref());
        let results = engine.discovery.discover(&servers, &ctx.cancel).await;
        self.checkpoint()?;

        tracing::info!(
            servers = results.len(),
            reachable = results.iter().filter(|r| r.reachable).count(),
            "Discovery pass complete"
        );

        let roster = bind(&engine.agents, &results, &engine.providers)?;
        let decision = engine.router.route(&ctx.raw_message, &roster)?;

        tracing::info!(
            agents = ?decision.agents,
            rule = ?decision.rule,
            reason = %decision.reason,
            "Request routed"
        );
        self.transition(WorkflowState::Routed);
        self.current_agent = decision.agents.first().cloned();
        self.events
            .routing_decision(&decision.agents, &decision.reason, false)
            .await?;

        let mut queue: VecDeque<String> = decision.agents.into();
        let mut history = vec![Message::user(ctx.raw_message.clone())];
        let mut pending_reason: Option<String> = None;

        while let Some(name) = queue.pop_front() {
            if !self.visited.insert(name.clone()) {
                return Err(RoutingFailure::DuplicateHandoff { agent: name }.into());
            }
            let agent = roster
                .get(&name)
                .ok_or_else(|| RoutingFailure::UnknownAgent {
                    agent: name.clone(),
                })?;

            if let Some(reason) = pending_reason.take() {
                self.transition(WorkflowState::Routed);
                self.events
                    .routing_decision(std::slice::from_ref(&name), &reason, true)
                    .await?;
            }
            self.current_agent = Some(name.clone());

            match self.run_agent(agent, &history).await? {
                AgentOutcome::Answer(text) => {
                    if queue.is_empty() {
                        return Ok(text);
                    }
                    if !text.is_empty() {
                        history.push(Message::assistant(text));
                    }
                    pending_reason = Some(format!("next in routed sequence after {name}"));
                }
                AgentOutcome::Handoff {
                    target,
                    reason,
                    text,
                } => {
                    if self.visited.contains(&target) {
                        return Err(RoutingFailure::DuplicateHandoff { agent: target }.into());
                    }
                    if !roster.contains(&target) {
                        return Err(RoutingFailure::UnknownAgent { agent: target }.into());
                    }
                    if !agent.handoffs().contains(&target) {
                        return Err(RoutingFailure::UndeclaredHandoff {
                            from: name,
                            to: target,
                        }
                        .into());
                    }
                    tracing::info!(from = %name, to = %target, "Agent handed off");
                    if !text.is_empty() {
                        history.push(Message::assistant(text));
                    }
                    pending_reason =
                        Some(reason.unwrap_or_else(|| format!("handoff from {name}")));
                    queue.push_front(target);
                }
            }
        }

        Err(RoutingFailure::NoAgentAvailable.into())
    }

    async fn run_agent(
        &mut self,
        agent: &Agent,
        history: &[Message],
    ) -> Result<AgentOutcome, WorkflowError> {
        self.transition(WorkflowState::Executing);

        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(Message::system(agent.instructions.clone()));
        messages.extend_from_slice(history);
        let tools = agent.tool_specs();

        loop {
            self.checkpoint()?;
            let req = DecisionRequest {
                correlation_id: self.ctx.correlation_id.clone(),
                agent: agent.name.clone(),
                messages: messages.clone(),
                tools: tools.clone(),
                handoff_targets: agent.handoffs().to_vec(),
            };
            let turn = self.turn(agent, req).await?;

            if let Some((target, reason)) = turn.handoff {
                if !turn.tool_calls.is_empty() {
                    tracing::warn!(
                        agent = %agent.name,
                        dropped = turn.tool_calls.len(),
                        "Ignoring tool calls issued alongside a handoff"
                    );
                }
                return Ok(AgentOutcome::Handoff {
                    target,
                    reason,
                    text: turn.text,
                });
            }
            if turn.tool_calls.is_empty() {
                return Ok(AgentOutcome::Answer(turn.text));
            }

            self.iterations += 1;
            let limit = self.engine.settings.max_tool_iterations;
            if self.iterations > limit {
                return Err(RoutingFailure::MaxIterationsExceeded { limit }.into());
            }

            self.transition(WorkflowState::ToolCall);
            messages.push(Message::assistant_tool_calls(
                Some(turn.text),
                turn.tool_calls.iter().map(ToolCall::from).collect(),
            ));
            let contents = self.call_tools(agent, &turn.tool_calls).await?;
            for (call, content) in turn.tool_calls.iter().zip(contents) {
                messages.push(Message::tool_result(call.id.clone(), content));
            }
            self.transition(WorkflowState::Executing);
        }
    }

    /// One decision-provider turn, streaming text out as partial output.
    async fn turn(&mut self, agent: &Agent, req: DecisionRequest) -> Result<TurnOutput, WorkflowError> {
        let ctx = self.ctx;
        let provider = agent.provider();
        let timeout = self.engine.settings.provider_timeout;
        let deadline = tokio::time::Instant::now() + timeout;

        tracing::debug!(
            agent = %agent.name,
            provider = %provider.name(),
            messages = req.messages.len(),
            tools = req.tools.len(),
            "Calling decision provider"
        );

        let mut stream = tokio::select! {
            () = ctx.cancel.cancelled() => return Err(WorkflowError::Cancelled),
            res = tokio::time::timeout_at(deadline, provider.stream(req)) => match res {
                Ok(stream) => stream?,
                Err(_) => return Err(ProviderError::Timeout(timeout).into()),
            },
        };

        let mut out = TurnOutput::default();
        loop {
            let next = tokio::select! {
                () = ctx.cancel.cancelled() => return Err(WorkflowError::Cancelled),
                res = tokio::time::timeout_at(deadline, stream.next()) => match res {
                    Ok(next) => next,
                    Err(_) => return Err(ProviderError::Timeout(timeout).into()),
                },
            };

            match next {
                None | Some(Ok(DecisionDelta::Done)) => break,
                Some(Ok(DecisionDelta::Text(text))) => {
                    self.events.partial_output(&agent.name, &text).await?;
                    out.text.push_str(&text);
                }
                Some(Ok(DecisionDelta::ToolCall(call))) => out.tool_calls.push(call),
                Some(Ok(DecisionDelta::Handoff { agent: target, reason })) => {
                    if out.handoff.is_none() {
                        out.handoff = Some((target, reason));
                    }
                }
                Some(Err(e)) => return Err(e.into()),
            }
        }
        Ok(out)
    }

    /// Execute one round of tool calls concurrently.
    ///
    /// Start events go out in issue order; end events as calls finish. The
    /// returned contents line up with `calls`.
    async fn call_tools(
        &mut self,
        agent: &Agent,
        calls: &[ToolCallRequest],
    ) -> Result<Vec<String>, WorkflowError> {
        let engine = self.engine;
        let ctx = self.ctx;

        let mut planned = Vec::with_capacity(calls.len());
        for call in calls {
            self.checkpoint()?;
            let bound = agent.resolve(&call.name);
            let server = bound.and_then(|b| engine.registry.get(&b.key.server_id).cloned());
            let (server_id, tool) = match bound {
                Some(b) => (b.key.server_id.clone(), b.key.tool_name.clone()),
                None => (String::new(), call.name.clone()),
            };

            tracing::info!(
                agent = %agent.name,
                call_id = %call.id,
                server_id = %server_id,
                tool = %tool,
                "Tool call started"
            );
            self.events
                .tool_call_start(&agent.name, &call.id, &server_id, &tool, &call.arguments)
                .await?;
            planned.push(PlannedCall {
                call,
                server,
                server_id,
                tool,
            });
        }

        let client = engine.discovery.client();
        let timeout = engine.settings.invocation_timeout;
        let mut pending: FuturesUnordered<_> = planned
            .iter()
            .enumerate()
            .map(|(idx, p)| {
                let client = Arc::clone(&client);
                async move {
                    let outcome = match &p.server {
                        Some(server) => {
                            invoke(
                                client.as_ref(),
                                server,
                                &p.tool,
                                p.call.arguments.clone(),
                                timeout,
                                &ctx.cancel,
                            )
                            .await
                        }
                        None => Err(ToolCallError::UnknownTool(p.call.name.clone())),
                    };
                    (idx, outcome)
                }
            })
            .collect();

        let mut contents = vec![String::new(); planned.len()];
        while let Some((idx, outcome)) = pending.next().await {
            let Some(p) = planned.get(idx) else { continue };
            self.events
                .tool_call_end(&agent.name, &p.call.id, &p.server_id, &p.tool, &outcome)
                .await?;
            contents[idx] = match outcome {
                Ok(value) => value.to_string(),
                Err(e) => e.to_payload().to_string(),
            };
        }

        self.checkpoint()?;
        Ok(contents)
    }
}
