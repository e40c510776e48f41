use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use tower_http::trace::TraceLayer;

use super::api::{self, AppState, SharedState};
use crate::config::ServiceConfig;
use crate::jobs::{JobPipeline, JobRunner};

/// Build the full application router.
pub fn build_router(state: SharedState) -> Router {
    api::api_router()
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve `state` on an already-bound listener until `shutdown` resolves,
/// then abort whatever jobs are still running.
pub async fn serve<F>(listener: tokio::net::TcpListener, state: SharedState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let runner = state.runner.clone();
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .context("Server error")?;

    runner.registry().abort_all().await;
    Ok(())
}

/// Start the gateway with production collaborators and block until Ctrl+C.
pub async fn start_server(config: &ServiceConfig) -> Result<()> {
    std::fs::create_dir_all(&config.workspace_root).with_context(|| {
        format!(
            "Failed to create workspace root {}",
            config.workspace_root.display()
        )
    })?;

    let pipeline = JobPipeline::from_config(config).context("Failed to initialize job pipeline")?;
    let state = Arc::new(AppState {
        secret: config.secret.clone(),
        runner: JobRunner::new(pipeline),
    });

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    let local_addr = listener.local_addr()?;
    tracing::info!(
        addr = %local_addr,
        workspace_root = %config.workspace_root.display(),
        "pagesmith listening"
    );

    serve(listener, state, shutdown_signal()).await?;

    tracing::info!("Server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
