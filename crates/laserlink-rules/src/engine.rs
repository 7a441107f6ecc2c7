//! Schedule engine.
//!
//! Every tick the engine loads the enabled rules, works out the local
//! time-of-day and, for each device, picks the highest-priority rule whose
//! window contains it. A match drives the device to that rule's scene;
//! no match falls back to the best applicable rule's off mode. Decisions are
//! only applied when they differ from the last one applied to the device.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Timelike, Utc};
use chrono_tz::Tz;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinHandle;

use laserlink_commands::{DeviceRegistry, Dispatcher};
use laserlink_core::{Command, DeviceId};

use crate::error::Result;
use crate::rule::{OffMode, ScheduleRule};
use crate::store::ScheduleRuleStore;

/// Target state for one device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    /// Show a scene; `command` is the scene argument string.
    Scene { command: String },
    Off { off_mode: OffMode },
}

impl Decision {
    /// Commands `emit`ted for this decision. The OFF macro has none.
    fn literal_commands(&self) -> Option<Vec<Command>> {
        match self {
            Decision::Scene { command } => Some(vec![Command::Scene {
                args: Some(command.clone()),
                val: command.split_whitespace().next().and_then(|n| n.parse().ok()),
            }]),
            Decision::Off {
                off_mode: OffMode::Direct,
            } => Some(vec![Command::Off]),
            Decision::Off {
                off_mode: OffMode::Macro,
            } => None,
        }
    }
}

/// Choose the decision for `device` at `minute` from `rules`.
///
/// Rules naming the device and wildcard rules compete on priority, ties
/// broken by lower id. `None` when no rule applies.
pub fn decide(rules: &[ScheduleRule], device: &str, minute: u16) -> Option<Decision> {
    let mut applicable: Vec<&ScheduleRule> = rules
        .iter()
        .filter(|r| r.enabled && r.applies_to(device))
        .collect();
    applicable.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.id.cmp(&b.id)));

    let fallback = applicable.first()?;
    match applicable.iter().find(|r| r.contains(minute)) {
        Some(rule) => Some(Decision::Scene {
            command: rule.scene_command.clone(),
        }),
        None => Some(Decision::Off {
            off_mode: fallback.off_mode,
        }),
    }
}

/// Minutes since local midnight of `now` in `tz`.
pub fn minute_of_day(now: DateTime<Utc>, tz: Tz) -> u16 {
    let local = now.with_timezone(&tz);
    (local.hour() * 60 + local.minute()) as u16
}

#[derive(Debug, Clone, Serialize)]
pub struct AppliedDecision {
    pub device: DeviceId,
    pub decision: Decision,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedDevice {
    pub device: DeviceId,
    pub error: String,
}

/// Outcome of one tick.
#[derive(Debug, Clone, Serialize)]
pub struct TickReport {
    pub at: DateTime<Utc>,
    pub minute: u16,
    /// Devices with at least one applicable rule.
    pub evaluated: usize,
    pub applied: Vec<AppliedDecision>,
    pub failed: Vec<FailedDevice>,
}

/// Periodic evaluator of schedule rules.
pub struct ScheduleEngine {
    store: Arc<ScheduleRuleStore>,
    dispatcher: Arc<Dispatcher>,
    registry: Arc<DeviceRegistry>,
    timezone: Tz,
    interval: Duration,
    /// Last successfully applied decision per device.
    applied: Mutex<HashMap<DeviceId, Decision>>,
    tick_lock: tokio::sync::Mutex<()>,
}

impl ScheduleEngine {
    pub fn new(
        store: Arc<ScheduleRuleStore>,
        dispatcher: Arc<Dispatcher>,
        registry: Arc<DeviceRegistry>,
        timezone: Tz,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            dispatcher,
            registry,
            timezone,
            interval,
            applied: Mutex::new(HashMap::new()),
            tick_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn store(&self) -> &Arc<ScheduleRuleStore> {
        &self.store
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// Last decision applied to `device`.
    pub fn applied_decision(&self, device: &str) -> Option<Decision> {
        self.applied.lock().get(device).cloned()
    }

    /// Evaluate now.
    pub async fn tick(&self) -> Result<TickReport> {
        self.tick_at(Utc::now()).await
    }

    /// Evaluate as if the current time were `now`.
    ///
    /// Fails only when the rules cannot be loaded; per-device failures are
    /// reported and do not stop the remaining devices.
    pub async fn tick_at(&self, now: DateTime<Utc>) -> Result<TickReport> {
        let _tick = self.tick_lock.lock().await;

        let rules = self.store.list_enabled()?;
        let minute = minute_of_day(now, self.timezone);

        let mut devices: BTreeSet<DeviceId> = self.registry.known_devices().into_iter().collect();
        devices.extend(rules.iter().filter_map(|r| r.device_id.clone()));

        let mut report = TickReport {
            at: now,
            minute,
            evaluated: 0,
            applied: Vec::new(),
            failed: Vec::new(),
        };

        for device in devices {
            let Some(decision) = decide(&rules, &device, minute) else {
                continue;
            };
            report.evaluated += 1;

            if self.applied.lock().get(&device) == Some(&decision) {
                continue;
            }

            match self.apply(&device, &decision).await {
                Ok(()) => {
                    tracing::info!(
                        category = "schedule",
                        device = %device,
                        decision = ?decision,
                        "Applied schedule decision"
                    );
                    self.applied.lock().insert(device.clone(), decision.clone());
                    report.applied.push(AppliedDecision { device, decision });
                }
                Err(e) => {
                    tracing::error!(
                        category = "schedule",
                        device = %device,
                        error = %e,
                        "Failed to apply schedule decision"
                    );
                    report.failed.push(FailedDevice {
                        device,
                        error: e.to_string(),
                    });
                }
            }
        }

        tracing::debug!(
            minute,
            evaluated = report.evaluated,
            applied = report.applied.len(),
            failed = report.failed.len(),
            "Schedule tick finished"
        );
        Ok(report)
    }

    async fn apply(&self, device: &str, decision: &Decision) -> Result<()> {
        match decision.literal_commands() {
            Some(commands) => {
                self.dispatcher.emit(device, &commands).await?;
            }
            None => {
                self.dispatcher.start_off(device).await?;
            }
        }
        Ok(())
    }

    /// Run ticks on the configured interval for the life of the process.
    pub fn start(self: Arc<Self>) -> JoinHandle<()> {
        tracing::info!(
            interval_sec = self.interval.as_secs(),
            timezone = %self.timezone,
            "Starting schedule engine"
        );
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = self.tick().await {
                    tracing::error!(category = "schedule", error = %e, "Schedule tick failed");
                }
            }
        })
    }
}
