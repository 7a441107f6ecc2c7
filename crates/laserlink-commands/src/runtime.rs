//! In-memory per-device state.
//!
//! A [`DeviceRuntime`] is created the first time a device id is referenced and
//! lives for the rest of the process. It holds:
//! - a bounded tail cache of recent actionable events
//! - `last_id`, the highest id published for the device
//! - `last_seen_at`, refreshed by every poll
//! - the parked long-poll waiters
//!
//! Cache, waiters and `last_id` sit behind one short-lived lock, so a poller
//! checking the cache and parking cannot miss a concurrent publish. A separate
//! async lock serializes append+publish per device.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::oneshot;

use laserlink_core::{DeviceId, Event, EventId};
use laserlink_storage::EventLog;

use crate::error::Result;

/// Handle of a parked poller within one device.
pub type WaiterId = u64;

/// What a parked poller receives when woken by a publish.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub events: Vec<Event>,
    pub cursor: EventId,
}

/// Result of checking the cache for a poller.
#[derive(Debug)]
pub enum CacheCheck {
    /// Events newer than the cursor were cached.
    Ready(Delivery),
    /// Nothing newer; the poller is now registered as a waiter.
    Parked(WaiterId, oneshot::Receiver<Delivery>),
    /// The cache does not cover the cursor; ask the log.
    Miss,
}

struct Waiter {
    cursor: EventId,
    tx: oneshot::Sender<Delivery>,
}

struct RuntimeState {
    /// Actionable events, ascending by id.
    cache: VecDeque<Event>,
    /// The cache holds every actionable event with id greater than this.
    complete_after: EventId,
    last_id: EventId,
    last_seen_at: Option<DateTime<Utc>>,
    waiters: HashMap<WaiterId, Waiter>,
    next_waiter: WaiterId,
}

impl RuntimeState {
    fn actionable_after(&self, cursor: EventId) -> Vec<Event> {
        self.cache
            .iter()
            .filter(|e| e.id > cursor)
            .cloned()
            .collect()
    }

    fn trim(&mut self, capacity: usize) {
        while self.cache.len() > capacity {
            if let Some(evicted) = self.cache.pop_front() {
                self.complete_after = self.complete_after.max(evicted.id);
            }
        }
    }
}

/// Point-in-time view of a runtime, for listings.
#[derive(Debug, Clone, Serialize)]
pub struct RuntimeSnapshot {
    pub device: DeviceId,
    pub last_id: EventId,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub cached: usize,
    pub parked: usize,
}

/// Mutable state of one device.
pub struct DeviceRuntime {
    device: DeviceId,
    capacity: usize,
    state: Mutex<RuntimeState>,
    write_lock: Arc<tokio::sync::Mutex<()>>,
}

impl DeviceRuntime {
    /// New runtime whose cache is authoritative from `last_id` on.
    pub fn new(device: impl Into<DeviceId>, last_id: EventId, capacity: usize) -> Self {
        Self {
            device: device.into(),
            capacity: capacity.max(1),
            state: Mutex::new(RuntimeState {
                cache: VecDeque::new(),
                complete_after: last_id,
                last_id,
                last_seen_at: None,
                waiters: HashMap::new(),
                next_waiter: 1,
            }),
            write_lock: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn last_id(&self) -> EventId {
        self.state.lock().last_id
    }

    pub fn last_seen_at(&self) -> Option<DateTime<Utc>> {
        self.state.lock().last_seen_at
    }

    /// Record a poll from the device.
    pub fn touch(&self) {
        self.state.lock().last_seen_at = Some(Utc::now());
    }

    pub fn parked_count(&self) -> usize {
        self.state.lock().waiters.len()
    }

    /// Serializes append+publish for this device.
    pub(crate) async fn lock_writes(&self) -> tokio::sync::OwnedMutexGuard<()> {
        self.write_lock.clone().lock_owned().await
    }

    /// Record freshly appended events and wake waiters.
    ///
    /// Each parked waiter receives the actionable events newer than its own
    /// cursor, exactly once, and is removed in the same critical section.
    /// Waiters with nothing new stay parked. Returns the number woken.
    pub fn publish(&self, events: &[Event]) -> usize {
        let mut state = self.state.lock();

        let mut newest = state.last_id;
        for event in events {
            newest = newest.max(event.id);
            if !event.is_actionable() {
                continue;
            }
            let tail = state.cache.back().map(|e| e.id).unwrap_or(state.complete_after);
            if event.id > tail {
                state.cache.push_back(event.clone());
            }
        }
        state.last_id = newest;
        state.trim(self.capacity);

        let ready: Vec<WaiterId> = state
            .waiters
            .iter()
            .filter(|(_, w)| events.iter().any(|e| e.is_actionable() && e.id > w.cursor))
            .map(|(id, _)| *id)
            .collect();

        let mut woken = 0;
        for id in ready {
            if let Some(waiter) = state.waiters.remove(&id) {
                let delivered: Vec<Event> = events
                    .iter()
                    .filter(|e| e.is_actionable() && e.id > waiter.cursor)
                    .cloned()
                    .collect();
                let cursor = delivered.last().map(|e| e.id).unwrap_or(waiter.cursor);
                // A closed receiver means the poller already gave up.
                if waiter.tx.send(Delivery { events: delivered, cursor }).is_ok() {
                    woken += 1;
                }
            }
        }
        if woken > 0 {
            tracing::debug!(device = %self.device, woken, last_id = newest, "Woke parked pollers");
        }
        woken
    }

    /// Serve `cursor` from the cache, or park when nothing is newer.
    pub fn check_or_park(&self, cursor: EventId) -> CacheCheck {
        let mut state = self.state.lock();
        if cursor < state.complete_after {
            return CacheCheck::Miss;
        }

        let events = state.actionable_after(cursor);
        if let Some(newest) = events.last().map(|e| e.id) {
            // A warmed event may be ahead of `last_id` until its publish lands.
            return CacheCheck::Ready(Delivery {
                events,
                cursor: state.last_id.max(cursor).max(newest),
            });
        }

        let id = state.next_waiter;
        state.next_waiter += 1;
        let (tx, rx) = oneshot::channel();
        state.waiters.insert(id, Waiter { cursor, tx });
        CacheCheck::Parked(id, rx)
    }

    /// Remove a parked waiter. `false` means a publish already resolved it.
    pub fn unpark(&self, id: WaiterId) -> bool {
        self.state.lock().waiters.remove(&id).is_some()
    }

    /// Fold a non-truncated log read into the cache.
    ///
    /// `events` must be every actionable event after `cursor` that the log held
    /// when queried, and `floor` the `last_id` observed before the query. The
    /// merge only happens when it leaves no gap in the cached range.
    pub fn warm(&self, cursor: EventId, events: &[Event], floor: EventId) {
        let mut state = self.state.lock();
        if cursor >= state.complete_after || state.complete_after > floor {
            return;
        }

        let first_cached = state.cache.front().map(|e| e.id).unwrap_or(EventId::MAX);
        let mut merged: VecDeque<Event> = events
            .iter()
            .filter(|e| e.is_actionable() && e.id > cursor && e.id < first_cached)
            .cloned()
            .collect();
        merged.extend(state.cache.drain(..));
        state.cache = merged;
        state.complete_after = cursor;
        state.trim(self.capacity);
    }

    pub fn snapshot(&self) -> RuntimeSnapshot {
        let state = self.state.lock();
        RuntimeSnapshot {
            device: self.device.clone(),
            last_id: state.last_id,
            last_seen_at: state.last_seen_at,
            cached: state.cache.len(),
            parked: state.waiters.len(),
        }
    }
}

/// Process-wide map of device runtimes, created on first reference.
pub struct DeviceRegistry {
    devices: DashMap<DeviceId, Arc<DeviceRuntime>>,
    log: Arc<dyn EventLog>,
    capacity: usize,
}

impl DeviceRegistry {
    pub fn new(log: Arc<dyn EventLog>, capacity: usize) -> Self {
        Self {
            devices: DashMap::new(),
            log,
            capacity,
        }
    }

    /// Get or create the runtime for `device`, seeding `last_id` from the log.
    pub fn get(&self, device: &str) -> Result<Arc<DeviceRuntime>> {
        if let Some(runtime) = self.devices.get(device) {
            return Ok(runtime.clone());
        }

        let last_id = self.log.last_id(device)?;
        let runtime = self
            .devices
            .entry(device.to_string())
            .or_insert_with(|| {
                tracing::debug!(device = %device, last_id, "Created device runtime");
                Arc::new(DeviceRuntime::new(device, last_id, self.capacity))
            })
            .clone();
        Ok(runtime)
    }

    /// Existing runtime, without creating one.
    pub fn peek(&self, device: &str) -> Option<Arc<DeviceRuntime>> {
        self.devices.get(device).map(|r| r.clone())
    }

    /// Ids of all runtimes created so far.
    pub fn known_devices(&self) -> Vec<DeviceId> {
        let mut ids: Vec<DeviceId> = self.devices.iter().map(|r| r.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn snapshots(&self) -> Vec<RuntimeSnapshot> {
        let mut snapshots: Vec<RuntimeSnapshot> =
            self.devices.iter().map(|r| r.value().snapshot()).collect();
        snapshots.sort_by(|a, b| a.device.cmp(&b.device));
        snapshots
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}
