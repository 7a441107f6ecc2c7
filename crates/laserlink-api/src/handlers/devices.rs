//! Device listing and raw log reads.

use std::collections::HashMap;

use axum::{
    extract::{Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use laserlink_commands::RuntimeSnapshot;
use laserlink_core::{DeviceId, Event, EventId};
use laserlink_storage::DeviceSummary;

use super::common::{parse_cursor, require_device};
use super::{HandlerResult, ServerState};

/// Persisted summaries included in the device list.
pub const DEVICE_LIST_LIMIT: usize = 200;

pub const DEFAULT_EVENTS_LIMIT: usize = 100;
pub const MAX_EVENTS_LIMIT: usize = 500;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceEntry {
    pub id: DeviceId,
    pub last_id: EventId,
    pub last_event_at: Option<DateTime<Utc>>,
    pub event_count: u64,
    /// Milliseconds since the epoch of the last poll, 0 if never polled.
    pub last_seen_at: i64,
    /// Events held in the tail cache.
    pub queue_len: usize,
    /// Polls currently waiting.
    pub parked: usize,
}

impl DeviceEntry {
    fn merge(summary: Option<DeviceSummary>, runtime: Option<&RuntimeSnapshot>) -> Option<Self> {
        let id = summary
            .as_ref()
            .map(|s| s.device.clone())
            .or_else(|| runtime.map(|r| r.device.clone()))?;
        Some(Self {
            id,
            last_id: summary
                .as_ref()
                .map(|s| s.last_id)
                .or_else(|| runtime.map(|r| r.last_id))
                .unwrap_or(0),
            last_event_at: summary.as_ref().map(|s| s.last_event_at),
            event_count: summary.as_ref().map_or(0, |s| s.event_count),
            last_seen_at: runtime
                .and_then(|r| r.last_seen_at)
                .map_or(0, |t| t.timestamp_millis()),
            queue_len: runtime.map_or(0, |r| r.cached),
            parked: runtime.map_or(0, |r| r.parked),
        })
    }
}

#[derive(Debug, Serialize)]
pub struct DevicesResponse {
    pub devices: Vec<DeviceEntry>,
}

/// Devices with stored events, most recent first, followed by devices that
/// have only polled.
pub async fn list_devices_handler(
    State(state): State<ServerState>,
) -> HandlerResult<DevicesResponse> {
    let summaries = state.services.log.list_devices(DEVICE_LIST_LIMIT)?;
    let mut runtimes: HashMap<DeviceId, RuntimeSnapshot> = state
        .services
        .registry
        .snapshots()
        .into_iter()
        .map(|s| (s.device.clone(), s))
        .collect();

    let mut devices: Vec<DeviceEntry> = summaries
        .into_iter()
        .filter_map(|summary| {
            let runtime = runtimes.remove(&summary.device);
            DeviceEntry::merge(Some(summary), runtime.as_ref())
        })
        .collect();

    let mut idle: Vec<RuntimeSnapshot> = runtimes.into_values().collect();
    idle.sort_by(|a, b| a.device.cmp(&b.device));
    devices.extend(idle.iter().filter_map(|r| DeviceEntry::merge(None, Some(r))));

    Ok(Json(DevicesResponse { devices }))
}

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    #[serde(default)]
    pub device: Option<String>,
    #[serde(default)]
    pub cursor: Option<String>,
    #[serde(default)]
    pub limit: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct EventsResponse {
    pub events: Vec<Event>,
    pub cursor: String,
}

pub fn clamp_events_limit(raw: Option<&str>) -> usize {
    raw.and_then(|l| l.trim().parse::<usize>().ok())
        .unwrap_or(DEFAULT_EVENTS_LIMIT)
        .clamp(1, MAX_EVENTS_LIMIT)
}

/// Raw log read, GET events included. Does not touch any runtime.
pub async fn list_events_handler(
    State(state): State<ServerState>,
    Query(query): Query<EventsQuery>,
) -> HandlerResult<EventsResponse> {
    let device = require_device(query.device.as_deref())?;
    let cursor = parse_cursor(query.cursor.as_deref());
    let limit = clamp_events_limit(query.limit.as_deref());

    let events = state.services.log.query_after(&device, cursor, limit, &[])?;
    let next = match events.last() {
        Some(event) => event.id,
        None => state.services.log.last_id(&device)?,
    };
    Ok(Json(EventsResponse {
        events,
        cursor: next.to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_limit_clamped() {
        assert_eq!(clamp_events_limit(None), 100);
        assert_eq!(clamp_events_limit(Some("0")), 1);
        assert_eq!(clamp_events_limit(Some("9999")), 500);
        assert_eq!(clamp_events_limit(Some("25")), 25);
        assert_eq!(clamp_events_limit(Some("many")), 100);
    }
}
