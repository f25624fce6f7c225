use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;
use tracing::info;

use crate::AppState;
use crate::config::AppConfig;
use crate::gateway;

/// Start the Axum server with the provided configuration.
pub async fn start_server(
    config: Arc<AppConfig>,
    metrics: Option<PrometheusHandle>,
) -> anyhow::Result<()> {
    match &config.llm {
        Some(llm) => info!(
            name: "llm.config.loaded",
            base_url = %llm.base_url,
            model = %llm.model,
            fallback = llm.fallback.is_some(),
            "Decision provider configured"
        ),
        None => tracing::warn!(
            "No decision provider configured; chat requests will fail with decision_provider_error"
        ),
    }

    let state = AppState::from_config(Arc::clone(&config), metrics)?;

    for server in state.engine.registry().all() {
        info!(
            name: "tool_server.registered",
            server_id = %server.id,
            url = %server.base_url,
            transport = server.transport.as_str(),
            "Tool server registered"
        );
    }

    let app = gateway::router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!(
        name: "server.started",
        address = %addr,
        "Server started"
    );

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!(name: "server.stopped", "Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("Shutdown signal received");
}
