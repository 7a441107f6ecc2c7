//! OFF2 cycle control and macro status.

use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use laserlink_commands::{MacroPlan, MacroStatus};

use super::{DeviceQuery, HandlerResult, ServerState};
use crate::models::ErrorResponse;

/// Both values in seconds.
#[derive(Debug, Default, Deserialize)]
pub struct CycleRequest {
    #[serde(default)]
    pub duration: Option<u64>,
    #[serde(default)]
    pub step: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct MacroResponse<T> {
    pub ok: bool,
    #[serde(rename = "macro")]
    pub macro_info: T,
}

#[derive(Debug, Serialize)]
pub struct StopResponse {
    pub ok: bool,
    /// Whether a cycle was running.
    pub stopped: bool,
}

pub async fn start_cycle_handler(
    State(state): State<ServerState>,
    Query(query): Query<DeviceQuery>,
    Json(request): Json<CycleRequest>,
) -> HandlerResult<MacroResponse<MacroPlan>> {
    let device = query.require()?;
    let (Some(duration), Some(step)) = (request.duration, request.step) else {
        return Err(ErrorResponse::bad_request("duration and step are required"));
    };
    let plan = state
        .services
        .dispatcher
        .start_cycle(&device, duration, step)
        .await?;
    Ok(Json(MacroResponse {
        ok: true,
        macro_info: plan,
    }))
}

pub async fn stop_cycle_handler(
    State(state): State<ServerState>,
    Query(query): Query<DeviceQuery>,
) -> HandlerResult<StopResponse> {
    let device = query.require()?;
    let stopped = state.services.dispatcher.stop_cycle(&device).await?;
    Ok(Json(StopResponse { ok: true, stopped }))
}

pub async fn macro_status_handler(
    State(state): State<ServerState>,
    Query(query): Query<DeviceQuery>,
) -> HandlerResult<MacroResponse<MacroStatus>> {
    let device = query.require()?;
    let status = state.services.dispatcher.macro_status(&device)?;
    Ok(Json(MacroResponse {
        ok: true,
        macro_info: status,
    }))
}
