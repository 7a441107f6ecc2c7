//! Liveness.

use axum::{extract::State, Json};
use chrono::Utc;
use serde::Serialize;

use super::{HandlerResult, ServerState};

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_secs: i64,
    /// Device runtimes in memory.
    pub devices: usize,
    pub schedule_enabled: bool,
}

pub async fn health_handler(State(state): State<ServerState>) -> HandlerResult<HealthStatus> {
    Ok(Json(HealthStatus {
        status: "ok",
        version: laserlink_core::VERSION,
        uptime_secs: (Utc::now() - state.started_at).num_seconds(),
        devices: state.services.registry.len(),
        schedule_enabled: state.config.schedule.enabled,
    }))
}
