//! Tool discovery: per-server listing, concurrent fan-out, and a freshness-bounded cache.
//!
//! Discovery never fails. Every failure mode (refused connection, protocol
//! error, timeout, budget exhaustion, cancellation) is folded into
//! [`DiscoveryResult::error`] with `reachable = false`.

use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use tokio::{sync::RwLock, task::JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use super::client::ToolServerClient;
use super::config::ToolServerDefinition;
use super::types::DiscoveryResult;

/// Ask one server for its tools, bounded by `timeout`.
pub async fn discover(
    client: &dyn ToolServerClient,
    server: &ToolServerDefinition,
    timeout: Duration,
) -> DiscoveryResult {
    match tokio::time::timeout(timeout, client.list_tools(server)).await {
        Ok(Ok(tools)) => {
            tracing::info!(
                server_id = %server.id,
                tool_count = tools.len(),
                "Tool server discovered"
            );
            DiscoveryResult::reachable(server.id.clone(), tools)
        }
        Ok(Err(e)) => {
            tracing::warn!(server_id = %server.id, error = %e, "Tool discovery failed");
            DiscoveryResult::unreachable(server.id.clone(), e.to_string())
        }
        Err(_) => {
            tracing::warn!(
                server_id = %server.id,
                timeout_ms = timeout.as_millis() as u64,
                "Tool discovery timed out"
            );
            DiscoveryResult::unreachable(
                server.id.clone(),
                format!("discovery timed out after {}ms", timeout.as_millis()),
            )
        }
    }
}

/// Discover every server concurrently, one task per server.
///
/// Completes when all results are in, when `budget` elapses, or when `cancel`
/// fires. Servers still pending at that point are reported unreachable and are
/// not retried within this pass. Results come back in `servers` order.
#[instrument(skip_all, fields(server_count = servers.len()))]
pub async fn discover_all(
    client: Arc<dyn ToolServerClient>,
    servers: &[ToolServerDefinition],
    per_server_timeout: Duration,
    budget: Duration,
    cancel: &CancellationToken,
) -> Vec<DiscoveryResult> {
    let deadline = tokio::time::Instant::now() + budget;
    let mut slots: Vec<Option<DiscoveryResult>> = vec![None; servers.len()];
    let mut set = JoinSet::new();

    for (idx, server) in servers.iter().cloned().enumerate() {
        let client = Arc::clone(&client);
        set.spawn(async move {
            let result = discover(client.as_ref(), &server, per_server_timeout).await;
            (idx, result)
        });
    }

    let mut pending_reason = None;
    while !set.is_empty() {
        tokio::select! {
            () = cancel.cancelled() => {
                pending_reason = Some("discovery cancelled".to_string());
                break;
            }
            joined = tokio::time::timeout_at(deadline, set.join_next()) => match joined {
                Ok(Some(Ok((idx, result)))) => {
                    if let Some(slot) = slots.get_mut(idx) {
                        *slot = Some(result);
                    }
                }
                Ok(Some(Err(e))) => {
                    tracing::error!(error = %e, "Discovery task failed");
                }
                Ok(None) => break,
                Err(_) => {
                    pending_reason = Some(format!(
                        "discovery budget of {}ms exceeded",
                        budget.as_millis()
                    ));
                    break;
                }
            }
        }
    }
    set.abort_all();

    let results: Vec<DiscoveryResult> = servers
        .iter()
        .zip(slots)
        .map(|(server, slot)| {
            slot.unwrap_or_else(|| {
                let reason = pending_reason
                    .clone()
                    .unwrap_or_else(|| "discovery task aborted".to_string());
                tracing::warn!(server_id = %server.id, reason = %reason, "Tool server still pending");
                DiscoveryResult::unreachable(server.id.clone(), reason)
            })
        })
        .collect();

    for r in &results {
        metrics::counter!(
            "orchestrator_discovery_servers_total",
            "reachable" => r.reachable.to_string()
        )
        .increment(1);
    }

    results
}

/// Discovery with a shared, read-mostly cache of reachable results.
///
/// A cached result is reused for at most `ttl`; unreachable results are never
/// cached so a recovered server is picked up by the next request. A zero `ttl`
/// disables caching.
#[derive(Clone)]
pub struct DiscoveryService {
    client: Arc<dyn ToolServerClient>,
    cache: Arc<RwLock<HashMap<String, (Instant, DiscoveryResult)>>>,
    ttl: Duration,
    per_server_timeout: Duration,
    budget: Duration,
}

impl std::fmt::Debug for DiscoveryService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscoveryService")
            .field("ttl", &self.ttl)
            .field("per_server_timeout", &self.per_server_timeout)
            .field("budget", &self.budget)
            .finish()
    }
}

impl DiscoveryService {
    pub fn new(
        client: Arc<dyn ToolServerClient>,
        ttl: Duration,
        per_server_timeout: Duration,
        budget: Duration,
    ) -> Self {
        Self {
            client,
            cache: Arc::new(RwLock::new(HashMap::new())),
            ttl,
            per_server_timeout,
            budget,
        }
    }

    pub fn client(&self) -> Arc<dyn ToolServerClient> {
        Arc::clone(&self.client)
    }

    /// Latest result per server, in `servers` order.
    pub async fn discover(
        &self,
        servers: &[ToolServerDefinition],
        cancel: &CancellationToken,
    ) -> Vec<DiscoveryResult> {
        let mut cached: HashMap<String, DiscoveryResult> = HashMap::new();
        if !self.ttl.is_zero() {
            let cache = self.cache.read().await;
            for s in servers {
                if let Some((at, result)) = cache.get(&s.id) {
                    if at.elapsed() < self.ttl {
                        cached.insert(s.id.clone(), result.clone());
                    }
                }
            }
        }

        let stale: Vec<ToolServerDefinition> = servers
            .iter()
            .filter(|s| !cached.contains_key(&s.id))
            .cloned()
            .collect();

        tracing::debug!(
            cached = cached.len(),
            to_discover = stale.len(),
            "Starting discovery pass"
        );

        if !stale.is_empty() {
            let fresh = discover_all(
                Arc::clone(&self.client),
                &stale,
                self.per_server_timeout,
                self.budget,
                cancel,
            )
            .await;

            if !self.ttl.is_zero() {
                let mut cache = self.cache.write().await;
                let now = Instant::now();
                for r in fresh.iter().filter(|r| r.reachable) {
                    cache.insert(r.server_id.clone(), (now, r.clone()));
                }
            }

            for r in fresh {
                cached.insert(r.server_id.clone(), r);
            }
        }

        servers
            .iter()
            .filter_map(|s| cached.remove(&s.id))
            .collect()
    }

    /// Drop every cached result.
    pub async fn invalidate(&self) {
        self.cache.write().await.clear();
    }
}
