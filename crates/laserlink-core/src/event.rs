//! Persisted command events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::command::{Command, CommandKind};
use crate::error::Result;
use crate::validation_err;

/// Controller identifier.
pub type DeviceId = String;

/// Global, strictly increasing event identifier. `0` means "nothing yet".
pub type EventId = u64;

/// Longest accepted device id.
pub const MAX_DEVICE_ID_LEN: usize = 128;

/// One appended command. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub device: DeviceId,
    pub ts: DateTime<Utc>,
    #[serde(flatten)]
    pub command: Command,
}

impl Event {
    pub fn kind(&self) -> CommandKind {
        self.command.kind()
    }

    /// Whether pollers should see this event.
    pub fn is_actionable(&self) -> bool {
        self.kind().is_actionable()
    }
}

/// Trim and check a device id, returning the canonical form.
pub fn validate_device_id(raw: &str) -> Result<DeviceId> {
    let id = raw.trim();
    if id.is_empty() {
        return Err(validation_err!("device is required"));
    }
    if id.chars().count() > MAX_DEVICE_ID_LEN {
        return Err(validation_err!(
            "device id longer than {} characters",
            MAX_DEVICE_ID_LEN
        ));
    }
    if id.chars().any(char::is_control) {
        return Err(validation_err!("device id contains control characters"));
    }
    Ok(id.to_string())
}
