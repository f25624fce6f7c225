//! Relaying a run's events to the client as NDJSON or SSE.

use std::{convert::Infallible, time::Duration};

use axum::{
    body::Body,
    http::header,
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
};
use chrono::Utc;
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::DropGuard;

use crate::error::codes;
use crate::events::{EventKind, WorkflowEvent, ndjson_frame};

pub const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

/// Forward `first` and everything after it from `rx`, in order.
///
/// The stream owns `guard`: if the client goes away the stream is dropped and
/// the run's cancellation token fires. If the run ends without a terminal
/// frame (it panicked or was aborted) a `workflow_aborted` error closes the
/// stream so the client never sees a silent end.
pub fn relay(
    first: WorkflowEvent,
    mut rx: mpsc::Receiver<WorkflowEvent>,
    guard: DropGuard,
) -> impl Stream<Item = WorkflowEvent> + Send + 'static {
    async_stream::stream! {
        let correlation_id = first.correlation_id.clone();
        let mut last_seq = first.seq;
        let mut terminal = first.terminal;
        yield first;

        while !terminal {
            let Some(event) = rx.recv().await else { break };
            last_seq = event.seq;
            terminal = event.terminal;
            yield event;
        }

        if terminal {
            tracing::debug!(correlation_id = %correlation_id, last_seq, "Stream complete");
        } else {
            tracing::error!(correlation_id = %correlation_id, last_seq, "Workflow ended without a terminal event");
            yield WorkflowEvent {
                seq: last_seq + 1,
                kind: EventKind::Error,
                agent: None,
                correlation_id,
                timestamp: Utc::now(),
                terminal: true,
                payload: serde_json::json!({
                    "code": codes::WORKFLOW_ABORTED,
                    "message": "workflow ended without a result",
                }),
            };
        }

        guard.disarm();
    }
}

/// Newline-delimited JSON, one event per line.
pub fn ndjson_response<S>(events: S) -> Response
where
    S: Stream<Item = WorkflowEvent> + Send + 'static,
{
    let body = Body::from_stream(events.map(|ev| Ok::<String, Infallible>(ndjson_frame(&ev))));
    (
        [
            (header::CONTENT_TYPE, NDJSON_CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        body,
    )
        .into_response()
}

/// Server-Sent Events: `event: <kind>`, `id: <seq>`, `data: <json>`.
pub fn sse_response<S>(events: S) -> Response
where
    S: Stream<Item = WorkflowEvent> + Send + 'static,
{
    let stream = events.map(|ev| {
        let json = serde_json::to_string(&ev).unwrap_or_else(|_| "{}".to_string());
        Ok::<Event, Infallible>(
            Event::default()
                .event(ev.kind.as_str())
                .id(ev.seq.to_string())
                .data(json),
        )
    });

    Sse::new(stream)
        .keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
        .into_response()
}
