//! Long-poll delivery.
//!
//! A poll resolves from the tail cache, then from the event log, and only
//! then parks. A parked poll ends in exactly one of three ways: a publish
//! hands it events, its wait budget runs out, or the caller goes away. The
//! first to remove the waiter from its runtime wins.

use std::sync::Arc;

use tokio::sync::oneshot;

use laserlink_core::{validate_device_id, CommandKind, EventId, PollConfig};
use laserlink_storage::EventLog;

use crate::error::Result;
use crate::runtime::{CacheCheck, Delivery, DeviceRegistry, DeviceRuntime, WaiterId};

/// How a poll ended.
#[derive(Debug, Clone)]
pub enum PollOutcome {
    /// At least one actionable event, and the cursor to poll with next.
    Events(Delivery),
    /// The wait budget ran out with nothing to deliver. The caller keeps its cursor.
    Timeout,
}

impl PollOutcome {
    pub fn is_timeout(&self) -> bool {
        matches!(self, PollOutcome::Timeout)
    }
}

/// Unparks the waiter if the poll future is dropped before it resolves.
struct ParkGuard {
    runtime: Arc<DeviceRuntime>,
    id: WaiterId,
    armed: bool,
}

impl ParkGuard {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for ParkGuard {
    fn drop(&mut self) {
        if self.armed && self.runtime.unpark(self.id) {
            tracing::debug!(device = %self.runtime.device(), waiter = self.id, "Poller went away");
        }
    }
}

/// Resolve a waiter whose wait budget ran out.
///
/// If a publish removed the waiter first, its delivery wins over the timeout.
fn settle_timeout(
    runtime: &DeviceRuntime,
    id: WaiterId,
    rx: &mut oneshot::Receiver<Delivery>,
) -> PollOutcome {
    if runtime.unpark(id) {
        return PollOutcome::Timeout;
    }
    match rx.try_recv() {
        Ok(delivery) => PollOutcome::Events(delivery),
        Err(_) => PollOutcome::Timeout,
    }
}

/// Resolves poll requests for all devices.
pub struct LongPollCoordinator {
    registry: Arc<DeviceRegistry>,
    log: Arc<dyn EventLog>,
    config: PollConfig,
}

impl LongPollCoordinator {
    pub fn new(registry: Arc<DeviceRegistry>, log: Arc<dyn EventLog>, config: PollConfig) -> Self {
        Self {
            registry,
            log,
            config,
        }
    }

    pub fn config(&self) -> &PollConfig {
        &self.config
    }

    /// Wait up to `wait_secs` (clamped) for events of `device` after `cursor`.
    ///
    /// Cancel-safe: dropping the returned future removes the parked waiter.
    pub async fn poll(
        &self,
        device: &str,
        cursor: EventId,
        wait_secs: Option<u64>,
    ) -> Result<PollOutcome> {
        let device = validate_device_id(device)?;
        let budget = self.config.clamp_wait(wait_secs);
        let runtime = self.registry.get(&device)?;
        runtime.touch();

        let mut cursor = cursor;
        let (id, rx) = loop {
            match runtime.check_or_park(cursor) {
                CacheCheck::Ready(delivery) => return Ok(PollOutcome::Events(delivery)),
                CacheCheck::Parked(id, rx) => break (id, rx),
                CacheCheck::Miss => {
                    let floor = runtime.last_id();
                    let events = self.log.query_after(
                        &device,
                        cursor,
                        self.config.fetch_limit,
                        &[CommandKind::Get],
                    )?;

                    if events.len() >= self.config.fetch_limit {
                        // Truncated: resume right after the last row handed out.
                        let next = events.last().map(|e| e.id).unwrap_or(cursor);
                        return Ok(PollOutcome::Events(Delivery {
                            events,
                            cursor: next,
                        }));
                    }
                    if !events.is_empty() {
                        runtime.warm(cursor, &events, floor);
                        let last = events.last().map(|e| e.id).unwrap_or(cursor);
                        return Ok(PollOutcome::Events(Delivery {
                            events,
                            cursor: last.max(floor),
                        }));
                    }
                    // Nothing actionable up to `floor`; re-check from there.
                    cursor = cursor.max(floor);
                }
            }
        };

        Ok(self.wait_parked(runtime, id, rx, budget).await)
    }

    async fn wait_parked(
        &self,
        runtime: Arc<DeviceRuntime>,
        id: WaiterId,
        mut rx: oneshot::Receiver<Delivery>,
        budget: std::time::Duration,
    ) -> PollOutcome {
        let mut guard = ParkGuard {
            runtime: runtime.clone(),
            id,
            armed: true,
        };

        let outcome = match tokio::time::timeout(budget, &mut rx).await {
            Ok(Ok(delivery)) => PollOutcome::Events(delivery),
            Ok(Err(_)) => PollOutcome::Timeout,
            Err(_) => settle_timeout(&runtime, id, &mut rx),
        };
        guard.disarm();

        if outcome.is_timeout() {
            tracing::trace!(device = %runtime.device(), "Poll timed out");
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use laserlink_core::{Command, Event};

    fn park(runtime: &DeviceRuntime, cursor: EventId) -> (WaiterId, oneshot::Receiver<Delivery>) {
        match runtime.check_or_park(cursor) {
            CacheCheck::Parked(id, rx) => (id, rx),
            other => panic!("expected park, got {:?}", other),
        }
    }

    #[test]
    fn test_publish_racing_timeout_is_delivered() {
        let runtime = DeviceRuntime::new("D1", 0, 10);
        let (id, mut rx) = park(&runtime, 0);

        // The publish lands after the timer fired but before the waiter is unparked.
        runtime.publish(&[Event {
            id: 1,
            device: "D1".to_string(),
            ts: Utc::now(),
            command: Command::Hang,
        }]);

        match settle_timeout(&runtime, id, &mut rx) {
            PollOutcome::Events(delivery) => {
                assert_eq!(delivery.events.len(), 1);
                assert_eq!(delivery.cursor, 1);
            }
            PollOutcome::Timeout => panic!("delivered events were dropped"),
        }
        assert_eq!(runtime.parked_count(), 0);
    }

    #[test]
    fn test_timeout_without_publish_unparks() {
        let runtime = DeviceRuntime::new("D1", 0, 10);
        let (id, mut rx) = park(&runtime, 0);

        assert!(settle_timeout(&runtime, id, &mut rx).is_timeout());
        assert_eq!(runtime.parked_count(), 0);
        // A later publish finds nobody to wake.
        assert_eq!(
            runtime.publish(&[Event {
                id: 1,
                device: "D1".to_string(),
                ts: Utc::now(),
                command: Command::Hang,
            }]),
            0
        );
    }
}
