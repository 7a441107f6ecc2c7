//! The event log contract.
//!
//! Every command a device should observe is appended here first. Ids are
//! allocated globally so a cursor taken from one response is always comparable
//! with the ids of later events, whatever device they belong to.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use laserlink_core::{Command, CommandKind, DeviceId, Event, EventId};

use crate::error::Result;

/// Per-device bookkeeping maintained alongside appends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceSummary {
    pub device: DeviceId,
    pub last_id: EventId,
    pub last_event_at: DateTime<Utc>,
    pub event_count: u64,
}

/// Append-only, crash-consistent command log.
///
/// Implementations are synchronous; callers on the async side hold them
/// behind an `Arc<dyn EventLog>`.
pub trait EventLog: Send + Sync {
    /// Append `commands` for `device` in one atomic write sharing one
    /// timestamp. Returned events carry their assigned ids, in order.
    fn append_batch(&self, device: &str, commands: &[Command]) -> Result<Vec<Event>>;

    /// Events of `device` with id greater than `cursor`, ascending, skipping
    /// kinds in `exclude`, at most `limit` of them.
    fn query_after(
        &self,
        device: &str,
        cursor: EventId,
        limit: usize,
        exclude: &[CommandKind],
    ) -> Result<Vec<Event>>;

    /// Highest id appended for `device`, `0` when there is none.
    fn last_id(&self, device: &str) -> Result<EventId>;

    /// Most recent event of `device` whose kind is not in `exclude`.
    fn last_event(&self, device: &str, exclude: &[CommandKind]) -> Result<Option<Event>>;

    /// Devices with at least one event, most recently written first.
    fn list_devices(&self, limit: usize) -> Result<Vec<DeviceSummary>>;

    /// Append a single command.
    fn append(&self, device: &str, command: Command) -> Result<Event> {
        let mut events = self.append_batch(device, std::slice::from_ref(&command))?;
        events.pop().ok_or_else(|| {
            crate::error::Error::Storage(format!("append for '{}' returned no event", device))
        })
    }
}
