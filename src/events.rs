//! Workflow events and their wire framing.
//!
//! A run produces a strictly ordered sequence of [`WorkflowEvent`]s through an
//! [`EventEmitter`]. The emitter owns the sequence counter, so numbering is
//! monotonic by construction, and it refuses to emit anything after a
//! terminal frame.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::mpsc;

use crate::error::{ToolCallError, WorkflowError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    RoutingDecision,
    ToolCallStart,
    ToolCallEnd,
    AgentPartialOutput,
    AgentComplete,
    Error,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RoutingDecision => "routing_decision",
            Self::ToolCallStart => "tool_call_start",
            Self::ToolCallEnd => "tool_call_end",
            Self::AgentPartialOutput => "agent_partial_output",
            Self::AgentComplete => "agent_complete",
            Self::Error => "error",
        }
    }

    /// `agent_complete` and `error` end a run.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::AgentComplete | Self::Error)
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One frame of a workflow run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowEvent {
    pub seq: u64,
    pub kind: EventKind,
    /// Agent the event belongs to; absent for failures before routing.
    pub agent: Option<String>,
    pub correlation_id: String,
    pub timestamp: DateTime<Utc>,
    pub terminal: bool,
    pub payload: serde_json::Value,
}

impl WorkflowEvent {
    /// Error code of an `error` frame.
    pub fn error_code(&self) -> Option<&str> {
        if self.kind != EventKind::Error {
            return None;
        }
        self.payload.get("code").and_then(|c| c.as_str())
    }
}

/// One NDJSON line for `event`.
pub fn ndjson_frame(event: &WorkflowEvent) -> String {
    let mut line = serde_json::to_string(event).unwrap_or_else(|_| "{}".to_string());
    line.push('\n');
    line
}

/// The consumer went away; nothing more can be delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("event stream closed by client")]
pub struct StreamClosed;

impl From<StreamClosed> for WorkflowError {
    fn from(_: StreamClosed) -> Self {
        Self::Cancelled
    }
}

/// Single producer side of a run's event channel.
#[derive(Debug)]
pub struct EventEmitter {
    correlation_id: String,
    next_seq: u64,
    finished: bool,
    tx: mpsc::Sender<WorkflowEvent>,
}

impl EventEmitter {
    pub fn new(correlation_id: impl Into<String>, tx: mpsc::Sender<WorkflowEvent>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            next_seq: 0,
            finished: false,
            tx,
        }
    }

    /// Bounded channel plus its emitter.
    pub fn channel(
        correlation_id: impl Into<String>,
        buffer: usize,
    ) -> (Self, mpsc::Receiver<WorkflowEvent>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (Self::new(correlation_id, tx), rx)
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Number of events emitted so far.
    pub fn emitted(&self) -> u64 {
        self.next_seq
    }

    pub async fn emit(
        &mut self,
        kind: EventKind,
        agent: Option<&str>,
        payload: serde_json::Value,
    ) -> Result<(), StreamClosed> {
        if self.finished {
            tracing::warn!(
                correlation_id = %self.correlation_id,
                kind = %kind,
                "Dropping event emitted after terminal frame"
            );
            return Ok(());
        }

        let event = WorkflowEvent {
            seq: self.next_seq,
            kind,
            agent: agent.map(ToString::to_string),
            correlation_id: self.correlation_id.clone(),
            timestamp: Utc::now(),
            terminal: kind.is_terminal(),
            payload,
        };
        self.next_seq += 1;
        if kind.is_terminal() {
            self.finished = true;
        }

        tracing::trace!(
            correlation_id = %self.correlation_id,
            seq = event.seq,
            kind = %kind,
            "Emitting workflow event"
        );
        self.tx.send(event).await.map_err(|_| StreamClosed)
    }

    pub async fn routing_decision(
        &mut self,
        agents: &[String],
        reason: &str,
        handoff: bool,
    ) -> Result<(), StreamClosed> {
        let agent = agents.first().map(String::as_str);
        self.emit(
            EventKind::RoutingDecision,
            agent,
            json!({ "agents": agents, "reason": reason, "handoff": handoff }),
        )
        .await
    }

    pub async fn tool_call_start(
        &mut self,
        agent: &str,
        call_id: &str,
        server_id: &str,
        tool: &str,
        arguments: &serde_json::Value,
    ) -> Result<(), StreamClosed> {
        self.emit(
            EventKind::ToolCallStart,
            Some(agent),
            json!({
                "call_id": call_id,
                "server_id": server_id,
                "tool": tool,
                "arguments": arguments,
            }),
        )
        .await
    }

    pub async fn tool_call_end(
        &mut self,
        agent: &str,
        call_id: &str,
        server_id: &str,
        tool: &str,
        outcome: &Result<serde_json::Value, ToolCallError>,
    ) -> Result<(), StreamClosed> {
        let payload = match outcome {
            Ok(result) => json!({
                "call_id": call_id,
                "server_id": server_id,
                "tool": tool,
                "ok": true,
                "result": result,
            }),
            Err(e) => json!({
                "call_id": call_id,
                "server_id": server_id,
                "tool": tool,
                "ok": false,
                "error": e.to_payload(),
            }),
        };
        self.emit(EventKind::ToolCallEnd, Some(agent), payload).await
    }

    pub async fn partial_output(&mut self, agent: &str, text: &str) -> Result<(), StreamClosed> {
        self.emit(EventKind::AgentPartialOutput, Some(agent), json!({ "text": text }))
            .await
    }

    pub async fn complete(&mut self, agent: &str, answer: &str) -> Result<(), StreamClosed> {
        self.emit(EventKind::AgentComplete, Some(agent), json!({ "answer": answer }))
            .await
    }

    pub async fn error(
        &mut self,
        agent: Option<&str>,
        err: &WorkflowError,
    ) -> Result<(), StreamClosed> {
        self.emit(
            EventKind::Error,
            agent,
            json!({ "code": err.code(), "message": err.to_string() }),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{RoutingFailure, codes};

    #[tokio::test]
    async fn test_sequence_numbers_are_monotonic() {
        let (mut emitter, mut rx) = EventEmitter::channel("corr-1", 8);
        emitter
            .routing_decision(&["EchoAgent".to_string()], "keyword 'ping'", false)
            .await
            .unwrap();
        emitter.partial_output("EchoAgent", "po").await.unwrap();
        emitter.complete("EchoAgent", "pong").await.unwrap();
        drop(emitter);

        let mut seqs = Vec::new();
        while let Some(ev) = rx.recv().await {
            assert_eq!(ev.correlation_id, "corr-1");
            seqs.push(ev.seq);
        }
        assert_eq!(seqs, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_nothing_after_terminal() {
        let (mut emitter, mut rx) = EventEmitter::channel("c", 8);
        let err = WorkflowError::from(RoutingFailure::NoAgentAvailable);
        emitter.error(None, &err).await.unwrap();
        emitter.partial_output("A", "late").await.unwrap();
        assert!(emitter.is_finished());
        drop(emitter);

        let first = rx.recv().await.unwrap();
        assert!(first.terminal);
        assert_eq!(first.error_code(), Some(codes::AGENT_ROUTING_FAILURE));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_closed_receiver_reports_stream_closed() {
        let (mut emitter, rx) = EventEmitter::channel("c", 1);
        drop(rx);
        assert_eq!(emitter.partial_output("A", "x").await, Err(StreamClosed));
    }

    #[test]
    fn test_ndjson_frame_shape() {
        let ev = WorkflowEvent {
            seq: 3,
            kind: EventKind::ToolCallEnd,
            agent: Some("EchoAgent".into()),
            correlation_id: "c".into(),
            timestamp: Utc::now(),
            terminal: false,
            payload: json!({"ok": true}),
        };
        let line = ndjson_frame(&ev);
        assert!(line.ends_with('\n'));
        let v: serde_json::Value = serde_json::from_str(line.trim()).unwrap();
        assert_eq!(v["kind"], "tool_call_end");
        assert_eq!(v["seq"], 3);
    }
}
