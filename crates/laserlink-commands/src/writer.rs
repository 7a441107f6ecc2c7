//! The single append+publish path.
//!
//! Every producer (operator submissions, macro steps, schedule decisions,
//! telemetry) writes through [`EventWriter`]. Holding a [`DeviceWriteGuard`]
//! excludes every other writer for that device, so appends and the wake-ups
//! they cause happen in id order.

use std::sync::Arc;

use laserlink_core::{Command, Event};
use laserlink_storage::EventLog;

use crate::error::Result;
use crate::runtime::{DeviceRegistry, DeviceRuntime};

/// Shared write path into the event log and device runtimes.
pub struct EventWriter {
    log: Arc<dyn EventLog>,
    registry: Arc<DeviceRegistry>,
}

impl EventWriter {
    pub fn new(log: Arc<dyn EventLog>, registry: Arc<DeviceRegistry>) -> Self {
        Self { log, registry }
    }

    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    pub fn log(&self) -> &Arc<dyn EventLog> {
        &self.log
    }

    /// Take the per-device write lock.
    pub async fn lock(&self, device: &str) -> Result<DeviceWriteGuard> {
        let runtime = self.registry.get(device)?;
        let guard = runtime.lock_writes().await;
        Ok(DeviceWriteGuard {
            runtime,
            log: self.log.clone(),
            _guard: guard,
        })
    }
}

/// Exclusive right to write events for one device.
pub struct DeviceWriteGuard {
    runtime: Arc<DeviceRuntime>,
    log: Arc<dyn EventLog>,
    _guard: tokio::sync::OwnedMutexGuard<()>,
}

impl DeviceWriteGuard {
    pub fn device(&self) -> &str {
        self.runtime.device()
    }

    /// Append `commands` as one batch, then publish them to pollers.
    pub fn append(&self, commands: &[Command]) -> Result<Vec<Event>> {
        let events = self.log.append_batch(self.runtime.device(), commands)?;
        self.runtime.publish(&events);
        Ok(events)
    }
}
