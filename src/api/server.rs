use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tokio::net::TcpListener;
use tower_http::decompression::RequestDecompressionLayer;
use tracing::info;

use super::{
    services::{
        cancel_job, clear_history, delete_job, get_history, get_job, health, list_files,
        list_jobs, submit_job,
    },
    state::AppState,
};
use crate::config::Config;
use crate::coordinator::Coordinator;
use crate::fetcher::Fetcher;
use crate::history::HistoryLog;
use crate::observability::Metrics;
use crate::strategy::{ChainConfig, DirectHttpStrategy, ExternalToolStrategy, Strategy, StrategyChain};

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Build the HTTP routing table over a ready application state.
/// Separated from [`run`] so tests can drive the router directly.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/jobs", post(submit_job).get(list_jobs))
        .route("/jobs/{job_id}", get(get_job).delete(delete_job))
        .route("/jobs/{job_id}/cancel", post(cancel_job))
        .route("/history", get(get_history).delete(clear_history))
        .route("/files", get(list_files))
        .route("/health", get(health))
        .with_state(state)
        // Automatically decompress gzip/deflate/brotli request bodies
        .layer(RequestDecompressionLayer::new())
}

pub async fn run(address: Option<SocketAddr>) -> Result<(), AnyError> {
    info!("Loading configuration");
    let config = Config::load().map_err(|e| format!("Failed to load config: {}", e))?;
    let address = address.unwrap_or(config.server.bind_addr);

    tokio::fs::create_dir_all(&config.download.dir)
        .await
        .map_err(|e| format!("Failed to create download directory: {}", e))?;

    info!(path = %config.history.path.display(), "Opening history log");
    let history = HistoryLog::open(config.history.path.clone());

    let strategies: Vec<Arc<dyn Strategy>> = vec![
        Arc::new(
            DirectHttpStrategy::new(config.download.dir.clone())
                .map_err(|e| format!("Failed to initialize HTTP strategy: {}", e))?,
        ),
        Arc::new(ExternalToolStrategy::new(
            config.tool.command.clone(),
            config.download.dir.clone(),
        )),
    ];
    let chain_config = ChainConfig {
        probe_timeout: config.download.probe_timeout(),
        fetch_timeout: config.download.fetch_timeout(),
        retry_backoff: config.download.retry_backoff(),
    };
    let fetcher: Arc<dyn Fetcher> = Arc::new(StrategyChain::new(strategies, chain_config));

    let metrics = Arc::new(Metrics::new());
    let coordinator = Arc::new(Coordinator::new(
        config.download.clone(),
        history,
        fetcher,
        Arc::clone(&metrics),
    ));
    let state = AppState::new(config, coordinator, metrics);

    let app = router(state);
    let listener = TcpListener::bind(address).await?;
    info!(%address, "mediagrab API listening");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to install signal handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
