//! Long-poll endpoint used by controllers.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use laserlink_commands::PollOutcome;
use laserlink_core::Event;

use super::common::{parse_cursor, require_device};
use super::ServerState;
use crate::models::ErrorResponse;

#[derive(Debug, Deserialize)]
pub struct PollQuery {
    #[serde(default)]
    pub device: Option<String>,
    /// Last id the controller has seen.
    #[serde(default)]
    pub cursor: Option<String>,
    /// Wait budget in seconds, clamped by the server.
    #[serde(default)]
    pub wait: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PollResponse {
    pub events: Vec<Event>,
    /// Cursor for the next poll, as a decimal string.
    pub cursor: String,
}

/// `200` with at least one event, or `204 No Content` when the wait ran out.
pub async fn poll_handler(
    State(state): State<ServerState>,
    Query(query): Query<PollQuery>,
) -> Result<Response, ErrorResponse> {
    let device = require_device(query.device.as_deref())?;
    let cursor = parse_cursor(query.cursor.as_deref());
    let wait = query.wait.as_deref().and_then(|w| w.trim().parse().ok());

    match state.services.poller.poll(&device, cursor, wait).await? {
        PollOutcome::Events(delivery) => Ok(Json(PollResponse {
            events: delivery.events,
            cursor: delivery.cursor.to_string(),
        })
        .into_response()),
        PollOutcome::Timeout => Ok(StatusCode::NO_CONTENT.into_response()),
    }
}
