//! Workflow engine: drives one request from routing to a terminal event.
//!
//! ```text
//! INIT -> ROUTED -> EXECUTING -> (TOOL_CALL -> EXECUTING)* -> COMPLETE
//!   \________\__________\______________\______________________-> FAILED
//! ```
//!
//! A hand-off, or the next agent of a routed sequence, re-enters `ROUTED`.
//! Each run owns its [`RequestContext`], roster and event sequence; nothing
//! mutable is shared between runs.

mod context;
mod engine;

pub use context::RequestContext;
pub use engine::{EngineSettings, RunOutcome, WorkflowEngine};

/// States of a workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowState {
    Init,
    Routed,
    Executing,
    ToolCall,
    Complete,
    Failed,
}

impl WorkflowState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Init => "INIT",
            Self::Routed => "ROUTED",
            Self::Executing => "EXECUTING",
            Self::ToolCall => "TOOL_CALL",
            Self::Complete => "COMPLETE",
            Self::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
