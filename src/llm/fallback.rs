use std::sync::Arc;

use futures::StreamExt;

use super::{DecisionProvider, DecisionRequest, DecisionStream};
use crate::error::ProviderError;

/// Tries `fallback` once when `primary` fails before producing any output.
///
/// Once the primary has streamed a delta the turn belongs to it; later
/// failures are reported as-is.
#[derive(Debug, Clone)]
pub struct FallbackProvider {
    primary: Arc<dyn DecisionProvider>,
    fallback: Arc<dyn DecisionProvider>,
}

impl FallbackProvider {
    pub fn new(primary: Arc<dyn DecisionProvider>, fallback: Arc<dyn DecisionProvider>) -> Self {
        Self { primary, fallback }
    }
}

#[async_trait::async_trait]
impl DecisionProvider for FallbackProvider {
    fn name(&self) -> &str {
        self.primary.name()
    }

    async fn stream(&self, req: DecisionRequest) -> Result<DecisionStream, ProviderError> {
        let mut primary = match self.primary.stream(req.clone()).await {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(
                    correlation_id = %req.correlation_id,
                    primary = %self.primary.name(),
                    fallback = %self.fallback.name(),
                    error = %e,
                    "Primary decision provider failed, using fallback"
                );
                return self.fallback.stream(req).await;
            }
        };

        match primary.next().await {
            Some(Ok(first)) => Ok(Box::pin(
                futures::stream::once(async move { Ok(first) }).chain(primary),
            )),
            Some(Err(e)) => {
                tracing::warn!(
                    correlation_id = %req.correlation_id,
                    error = %e,
                    "Primary decision provider failed mid-start, using fallback"
                );
                self.fallback.stream(req).await
            }
            None => Ok(Box::pin(futures::stream::empty())),
        }
    }
}
