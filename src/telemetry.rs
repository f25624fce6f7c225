use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_FILTER: &str = "info,mcp_orchestrator=debug";

/// Initialize logging.
///
/// - `RUST_LOG` sets levels, defaulting to `info,mcp_orchestrator=debug`.
/// - `LOG_FORMAT=json` switches to one JSON object per line.
pub fn init() {
    let filter_layer =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter_layer);
    if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_target(true),
            )
            .init();
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_line_number(true)
                    .compact(),
            )
            .init();
    }
}

/// Install the global Prometheus recorder and return the handle that renders it.
pub fn install_metrics() -> anyhow::Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    metrics::describe_counter!(
        "orchestrator_workflow_runs_total",
        "Workflow runs by terminal outcome"
    );
    metrics::describe_counter!(
        "orchestrator_tool_calls_total",
        "Tool invocations by server and outcome"
    );
    metrics::describe_counter!(
        "orchestrator_discovery_servers_total",
        "Per-server discovery results by reachability"
    );
    metrics::describe_histogram!(
        "orchestrator_tool_call_duration_seconds",
        metrics::Unit::Seconds,
        "Tool invocation latency"
    );

    Ok(handle)
}
