//! Web server for the relay.

pub mod router;
pub mod state;

pub use router::create_router;
pub use state::{ServerState, MAX_REQUEST_BODY_SIZE};

use laserlink_core::RelayConfig;

/// Open storage from `config` and serve until a shutdown signal.
pub async fn run(config: RelayConfig) -> anyhow::Result<()> {
    let state = ServerState::open(config)?;
    serve(state).await
}

/// Serve an already built state on `state.config.bind`.
pub async fn serve(state: ServerState) -> anyhow::Result<()> {
    let schedule_task = if state.config.schedule.enabled {
        Some(state.schedules.clone().start())
    } else {
        tracing::info!("Schedule engine disabled");
        None
    };

    let app = create_router(state.clone());
    let listener = tokio::net::TcpListener::bind(state.config.bind.as_str()).await?;
    tracing::info!(
        address = %listener.local_addr()?,
        admin_auth = state.admin_token().is_some(),
        version = laserlink_core::VERSION,
        "laserlink relay listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(crate::shutdown::shutdown_signal())
        .await?;

    if let Some(task) = schedule_task {
        task.abort();
    }
    crate::shutdown::cleanup_resources(&state).await;

    tracing::info!("Server shutdown complete");
    Ok(())
}
