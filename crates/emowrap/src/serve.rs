//! HTTP server entry point.

use anyhow::{Context, Result};
use cortex_session::BackendFactory;
use emoconf::EmoConfig;
use std::sync::Arc;
use tracing::{info, warn};

use crate::api::{router, AppState};

/// Run the recording server until SIGINT/SIGTERM.
pub async fn run(config: EmoConfig) -> Result<()> {
    info!("🧠 emowrap starting");
    info!("   Data: {}", config.infra.paths.data_dir.display());
    info!("   Logs: {}", config.infra.paths.log_dir.display());
    info!("   Exports: {}", config.infra.paths.export_dir.display());
    info!(
        "   Backend: {:?}, ready timeout {} ms",
        config.bootstrap.cortex.backend, config.bootstrap.recording.ready_timeout_ms
    );

    let addr = config.infra.bind.addr();
    let factory = Arc::new(BackendFactory::new(config.bootstrap.cortex.clone()));
    let state = AppState::new(config, factory);
    let app = router(state.clone());

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("🧠 emowrap ready on http://{}", addr);
    info!("   Health: GET http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    abandon_live_recordings(&state).await;
    info!("Shutdown complete");
    Ok(())
}

/// Close SDK connections and flush logs of recordings still in flight.
async fn abandon_live_recordings(state: &AppState) {
    for snapshot in state.registry.snapshots() {
        if snapshot.state.is_terminal() {
            continue;
        }
        if let Some(controller) = state.registry.get(snapshot.run_id) {
            warn!(run_id = snapshot.run_id, state = %snapshot.state, "abandoning recording on shutdown");
            controller.abandon("Server shutting down").await;
        }
    }
}

async fn shutdown_signal() {
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received SIGINT, shutting down...");
        }
        _ = terminate() => {
            info!("Received SIGTERM, shutting down...");
        }
    }
}

#[cfg(unix)]
async fn terminate() {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            warn!(error = %e, "SIGTERM handler unavailable");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await;
}
