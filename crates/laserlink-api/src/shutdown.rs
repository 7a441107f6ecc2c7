//! Graceful shutdown handling for the web server.

use crate::server::ServerState;

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}

/// Clean up resources after the server stops accepting requests.
pub async fn cleanup_resources(state: &ServerState) {
    tracing::info!("Cleaning up resources...");

    // Pending macro steps are dropped, not flushed.
    state.services.shutdown();

    tracing::info!(
        devices = state.services.registry.len(),
        uptime_secs = (chrono::Utc::now() - state.started_at).num_seconds(),
        "Cleanup complete"
    );
}
