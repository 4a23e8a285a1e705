use std::net::SocketAddr;
use std::time::Duration;

use axum::{Router, routing::get, routing::post};
use tokio::net::TcpListener;
use tower_http::decompression::RequestDecompressionLayer;
use tracing::{error, info, warn};

use super::{
    services::{
        cancel_job, get_job, get_progress, get_result, health, list_collections, list_jobs,
        list_prefixes, submit_job,
    },
    state::AppState,
};
use crate::config::Config;

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// How often idle servers drop expired jobs; `start_job` also prunes
const PRUNE_INTERVAL: Duration = Duration::from_secs(60);

/// All routes, with request decompression applied
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/jobs", post(submit_job).get(list_jobs))
        .route("/jobs/{job_id}", get(get_job))
        .route("/jobs/{job_id}/progress", get(get_progress))
        .route("/jobs/{job_id}/result", get(get_result))
        .route("/jobs/{job_id}/cancel", post(cancel_job))
        .route("/catalog/collections", post(list_collections))
        .route("/catalog/prefixes", post(list_prefixes))
        .route("/health", get(health))
        .with_state(state)
        // Automatically decompress gzip request bodies
        .layer(RequestDecompressionLayer::new())
}

pub async fn run(config: Config, address: Option<SocketAddr>) -> Result<(), AnyError> {
    let address = address.unwrap_or(config.server.bind_addr);

    let orchestrator = config
        .orchestrator()
        .map_err(|e| format!("Failed to open document store: {}", e))?;
    info!(
        batch_limit = orchestrator.settings().batch_limit,
        transforms = config.transforms.len(),
        blob_provider = ?config.backend.blob_provider,
        "Migration engine ready"
    );

    let state = AppState::new(config, orchestrator);
    let jobs = state.jobs.clone();
    let app = router(state);

    let pruner = {
        let jobs = jobs.clone();
        tokio::spawn(async move {
            let period = PRUNE_INTERVAL.min(jobs.retention()).max(Duration::from_secs(1));
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                jobs.prune_finished();
            }
        })
    };

    let listener = TcpListener::bind(address).await?;
    info!(%address, "ShiftBox API listening");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    pruner.abort();
    let cancelled = jobs.cancel_all();
    if cancelled > 0 {
        warn!(cancelled, "Running jobs cancelled on shutdown");
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                error!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
