use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Per-request state created at the gateway and owned by one workflow run.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub correlation_id: String,
    pub raw_message: String,
    /// Tool servers the caller allowed; `None` allows every configured server.
    pub allowed_tool_server_ids: Option<Vec<String>>,
    pub cancel: CancellationToken,
}

impl RequestContext {
    pub fn new(message: impl Into<String>, allowed_tool_server_ids: Option<Vec<String>>) -> Self {
        Self {
            correlation_id: Uuid::new_v4().to_string(),
            raw_message: message.into(),
            allowed_tool_server_ids,
            cancel: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = id.into();
        self
    }

    #[must_use]
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
