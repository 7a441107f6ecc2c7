//! Schedule engine tests against a real dispatcher.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};

use laserlink_commands::RelayServices;
use laserlink_core::{Command, CommandKind, Event, EventId, MacroConfig, PollConfig};
use laserlink_rules::{Decision, OffMode, ScheduleEngine, ScheduleRuleInput, ScheduleRuleStore};
use laserlink_storage::{DeviceSummary, EventLog, RedbEventLog};

/// Event log that refuses appends for one device.
struct FailingLog {
    inner: RedbEventLog,
    broken: String,
}

impl EventLog for FailingLog {
    fn append_batch(
        &self,
        device: &str,
        commands: &[Command],
    ) -> laserlink_storage::Result<Vec<Event>> {
        if device == self.broken {
            return Err(laserlink_storage::Error::Storage("disk full".to_string()));
        }
        self.inner.append_batch(device, commands)
    }

    fn query_after(
        &self,
        device: &str,
        cursor: EventId,
        limit: usize,
        exclude: &[CommandKind],
    ) -> laserlink_storage::Result<Vec<Event>> {
        self.inner.query_after(device, cursor, limit, exclude)
    }

    fn last_id(&self, device: &str) -> laserlink_storage::Result<EventId> {
        self.inner.last_id(device)
    }

    fn last_event(
        &self,
        device: &str,
        exclude: &[CommandKind],
    ) -> laserlink_storage::Result<Option<Event>> {
        self.inner.last_event(device, exclude)
    }

    fn list_devices(&self, limit: usize) -> laserlink_storage::Result<Vec<DeviceSummary>> {
        self.inner.list_devices(limit)
    }
}

struct Harness {
    services: RelayServices,
    store: Arc<ScheduleRuleStore>,
    engine: ScheduleEngine,
}

fn make_harness(log: Arc<dyn EventLog>) -> Harness {
    let services = RelayServices::new(log, PollConfig::default(), MacroConfig::default());
    let store = Arc::new(ScheduleRuleStore::memory().expect("Failed to create rule store"));
    let engine = ScheduleEngine::new(
        store.clone(),
        services.dispatcher.clone(),
        services.registry.clone(),
        chrono_tz::UTC,
        Duration::from_secs(60),
    );
    Harness {
        services,
        store,
        engine,
    }
}

fn redb_harness() -> Harness {
    make_harness(Arc::new(RedbEventLog::memory().unwrap()))
}

fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, hour, minute, 0).unwrap()
}

fn rule(device: Option<&str>, start: &str, end: &str, scene: &str) -> ScheduleRuleInput {
    ScheduleRuleInput {
        device_id: device.map(String::from),
        start_time: Some(start.to_string()),
        end_time: Some(end.to_string()),
        scene_command: Some(scene.to_string()),
        ..Default::default()
    }
}

fn kinds(harness: &Harness, device: &str) -> Vec<CommandKind> {
    harness
        .services
        .log
        .query_after(device, 0, 100, &[])
        .unwrap()
        .iter()
        .map(Event::kind)
        .collect()
}

#[tokio::test]
async fn test_repeated_tick_is_idempotent() {
    let h = redb_harness();
    h.store.upsert(rule(None, "00:00", "00:00", "3")).unwrap();
    h.services.registry.get("D1").unwrap();

    let first = h.engine.tick_at(at(12, 0)).await.unwrap();
    assert_eq!(first.evaluated, 1);
    assert_eq!(first.applied.len(), 1);
    assert_eq!(kinds(&h, "D1"), vec![CommandKind::Scene]);

    let second = h.engine.tick_at(at(12, 1)).await.unwrap();
    assert!(second.applied.is_empty());
    assert_eq!(kinds(&h, "D1").len(), 1);
    assert_eq!(
        h.engine.applied_decision("D1"),
        Some(Decision::Scene {
            command: "3".to_string()
        })
    );
}

#[tokio::test]
async fn test_overnight_window_with_direct_off() {
    let h = redb_harness();
    let mut input = ScheduleRuleInput {
        device_id: Some("D1".to_string()),
        window_start: Some(1380),
        window_end: Some(60),
        scene_command: Some("SCENE 2".to_string()),
        ..Default::default()
    };
    input.off_mode = Some("DIRECT".to_string());
    h.store.upsert(input).unwrap();

    h.engine.tick_at(at(23, 45)).await.unwrap();
    h.engine.tick_at(at(12, 0)).await.unwrap();
    h.engine.tick_at(at(0, 15)).await.unwrap();

    assert_eq!(
        kinds(&h, "D1"),
        vec![CommandKind::Scene, CommandKind::Off, CommandKind::Scene]
    );
    let events = h.services.log.query_after("D1", 0, 10, &[]).unwrap();
    assert_eq!(
        events[0].command,
        Command::Scene {
            args: Some("2".to_string()),
            val: Some(2)
        }
    );
}

#[tokio::test(start_paused = true)]
async fn test_off_mode_runs_macro() {
    let h = redb_harness();
    h.store.upsert(rule(Some("D1"), "08:00", "17:00", "4")).unwrap();

    let report = h.engine.tick_at(at(20, 0)).await.unwrap();
    assert_eq!(
        report.applied[0].decision,
        Decision::Off {
            off_mode: OffMode::Macro
        }
    );
    assert!(h.services.dispatcher.macros().is_running("D1"));

    tokio::time::sleep(Duration::from_secs(100)).await;
    assert_eq!(kinds(&h, "D1").len(), 5);

    // Same decision on the next tick: the macro is not restarted.
    h.engine.tick_at(at(20, 1)).await.unwrap();
    tokio::time::sleep(Duration::from_secs(100)).await;
    assert_eq!(kinds(&h, "D1").len(), 5);
}

#[tokio::test(start_paused = true)]
async fn test_scene_decision_cancels_running_macro() {
    let h = redb_harness();
    h.store.upsert(rule(Some("D1"), "08:00", "17:00", "4")).unwrap();
    h.services.dispatcher.start_off("D1").await.unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;

    h.engine.tick_at(at(9, 0)).await.unwrap();
    assert!(!h.services.dispatcher.macros().is_running("D1"));

    tokio::time::sleep(Duration::from_secs(100)).await;
    assert_eq!(kinds(&h, "D1"), vec![CommandKind::Scene, CommandKind::Scene]);
}

#[tokio::test]
async fn test_one_failing_device_does_not_stop_tick() {
    let log = FailingLog {
        inner: RedbEventLog::memory().unwrap(),
        broken: "BROKEN".to_string(),
    };
    let h = make_harness(Arc::new(log));
    h.store.upsert(rule(None, "00:00", "00:00", "1")).unwrap();
    h.services.registry.get("BROKEN").unwrap();
    h.services.registry.get("D1").unwrap();

    let report = h.engine.tick_at(at(10, 0)).await.unwrap();
    assert_eq!(report.evaluated, 2);
    assert_eq!(report.applied.len(), 1);
    assert_eq!(report.applied[0].device, "D1");
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].device, "BROKEN");

    // The failed device is retried; the applied one is not repeated.
    let report = h.engine.tick_at(at(10, 1)).await.unwrap();
    assert!(report.applied.is_empty());
    assert_eq!(report.failed.len(), 1);
    assert!(h.engine.applied_decision("BROKEN").is_none());
}

#[tokio::test]
async fn test_devices_without_rules_are_untouched() {
    let h = redb_harness();
    h.store.upsert(rule(Some("D9"), "00:00", "00:00", "1")).unwrap();
    h.services.registry.get("D1").unwrap();

    let report = h.engine.tick_at(at(10, 0)).await.unwrap();
    assert_eq!(report.evaluated, 1);
    assert_eq!(report.applied[0].device, "D9");
    assert!(kinds(&h, "D1").is_empty());
}

#[tokio::test]
async fn test_disabled_rules_are_ignored() {
    let h = redb_harness();
    let mut input = rule(Some("D1"), "00:00", "00:00", "1");
    input.enabled = Some(false);
    h.store.upsert(input).unwrap();

    let report = h.engine.tick_at(at(10, 0)).await.unwrap();
    assert_eq!(report.evaluated, 0);
    assert!(kinds(&h, "D1").is_empty());
}
