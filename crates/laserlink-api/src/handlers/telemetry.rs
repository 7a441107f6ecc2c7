//! Status reports from controllers.

use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use laserlink_core::{DeviceStatus, Event};

use super::{DeviceQuery, HandlerResult, ServerState};

#[derive(Debug, Deserialize)]
pub struct StatusReport {
    /// `ON` or `OFF`, any case.
    pub status: String,
    #[serde(default)]
    pub deviation: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub ok: bool,
    pub event: Event,
}

pub async fn status_handler(
    State(state): State<ServerState>,
    Query(query): Query<DeviceQuery>,
    Json(report): Json<StatusReport>,
) -> HandlerResult<StatusResponse> {
    let device = query.require()?;
    let status = DeviceStatus::parse(&report.status)?;
    let event = state
        .services
        .dispatcher
        .report_status(&device, status, report.deviation)
        .await?;
    Ok(Json(StatusResponse { ok: true, event }))
}
