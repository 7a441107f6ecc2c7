//! Operator command submission.

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Serialize;

use laserlink_commands::SubmitOutcome;
use laserlink_core::SubmitBody;

use super::{DeviceQuery, HandlerResult, ServerState};

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub ok: bool,
    #[serde(flatten)]
    pub outcome: SubmitOutcome,
}

/// `POST /api/v1/cmd?device=ID` with one command, an array, or `{events: [...]}`.
pub async fn submit_handler(
    State(state): State<ServerState>,
    Query(query): Query<DeviceQuery>,
    Json(body): Json<SubmitBody>,
) -> HandlerResult<SubmitResponse> {
    let device = query.require()?;
    let commands = body.into_commands()?;
    let outcome = state.services.dispatcher.submit(&device, commands).await?;
    Ok(Json(SubmitResponse { ok: true, outcome }))
}
