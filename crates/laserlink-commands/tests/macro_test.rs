//! OFF and OFF2 macro timing and cancellation.

use std::sync::Arc;
use std::time::Duration;

use laserlink_commands::{MacroKind, MacroState, RelayServices};
use laserlink_core::{Command, CommandKind, DeviceStatus, MacroConfig, PollConfig};
use laserlink_storage::{EventLog, RedbEventLog};

fn make_services() -> RelayServices {
    let log: Arc<dyn EventLog> = Arc::new(RedbEventLog::memory().expect("Failed to create log"));
    RelayServices::new(log, PollConfig::default(), MacroConfig::default())
}

fn commands(services: &RelayServices, device: &str) -> Vec<Command> {
    services
        .log
        .query_after(device, 0, 100, &[])
        .unwrap()
        .into_iter()
        .map(|e| e.command)
        .collect()
}

async fn advance(secs: u64) {
    tokio::time::sleep(Duration::from_secs(secs)).await;
}

#[tokio::test(start_paused = true)]
async fn test_off_macro_fires_five_steps_on_schedule() {
    let services = make_services();

    let outcome = services
        .dispatcher
        .submit("D1", vec![Command::Off])
        .await
        .unwrap();
    assert!(outcome.added.is_empty());
    let plan = outcome.macro_plan.unwrap();
    assert_eq!(plan.kind, MacroKind::OffSequence);
    assert_eq!(plan.schedule_sec, Some(vec![0, 20, 40, 60, 80]));

    let expected_counts = [(1, 1), (20, 2), (20, 3), (20, 4), (20, 5)];
    for (secs, count) in expected_counts {
        advance(secs).await;
        let seen = commands(&services, "D1");
        assert_eq!(seen.len(), count, "after +{}s", secs);
        if count < 5 {
            assert!(seen.iter().all(|c| c.kind() != CommandKind::Off));
        }
    }

    assert_eq!(
        commands(&services, "D1"),
        vec![
            Command::Scene {
                args: Some("1".to_string()),
                val: Some(1)
            },
            Command::raw("1 0"),
            Command::raw("40 0"),
            Command::raw("50 0"),
            Command::Off,
        ]
    );
    assert_eq!(
        services.dispatcher.macro_status("D1").unwrap().state,
        MacroState::Completed
    );
}

#[tokio::test(start_paused = true)]
async fn test_retrigger_restarts_from_step_zero() {
    let services = make_services();
    services.dispatcher.submit("D1", vec![Command::Off]).await.unwrap();
    advance(25).await;
    assert_eq!(commands(&services, "D1").len(), 2);

    services.dispatcher.submit("D1", vec![Command::Off]).await.unwrap();
    advance(100).await;

    let kinds: Vec<CommandKind> = commands(&services, "D1").iter().map(Command::kind).collect();
    assert_eq!(
        kinds,
        vec![
            CommandKind::Scene,
            CommandKind::Raw,
            CommandKind::Scene,
            CommandKind::Raw,
            CommandKind::Raw,
            CommandKind::Raw,
            CommandKind::Off,
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_direct_command_cancels_macro() {
    let services = make_services();
    services.dispatcher.submit("D1", vec![Command::Off]).await.unwrap();
    advance(1).await;

    services
        .dispatcher
        .submit("D1", vec![Command::scene("5")])
        .await
        .unwrap();
    advance(100).await;

    let seen = commands(&services, "D1");
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[1], Command::scene("5"));

    let status = services.dispatcher.macro_status("D1").unwrap();
    assert_eq!(status.state, MacroState::Cancelled);
    assert_eq!(status.kind, Some(MacroKind::OffSequence));
}

#[tokio::test(start_paused = true)]
async fn test_get_and_telemetry_do_not_cancel_macro() {
    let services = make_services();
    services.dispatcher.submit("D1", vec![Command::Off]).await.unwrap();
    advance(1).await;

    services.dispatcher.submit("D1", vec![Command::Get]).await.unwrap();
    services
        .dispatcher
        .report_status("D1", DeviceStatus::On, Some(0.5))
        .await
        .unwrap();
    advance(100).await;

    let kinds: Vec<CommandKind> = commands(&services, "D1").iter().map(Command::kind).collect();
    assert_eq!(kinds.iter().filter(|k| **k == CommandKind::Raw).count(), 3);
    assert_eq!(kinds.last(), Some(&CommandKind::Off));
    assert!(kinds.contains(&CommandKind::Status));
}

#[tokio::test(start_paused = true)]
async fn test_cycle_runs_until_duration() {
    let services = make_services();
    let plan = services.dispatcher.start_cycle("D1", 10, 3).await.unwrap();
    assert_eq!(plan.kind, MacroKind::Cycle);
    assert_eq!(plan.duration_sec, Some(10));

    advance(30).await;
    // Steps at 0s, 3s, 6s and 9s.
    assert_eq!(
        commands(&services, "D1"),
        vec![
            Command::raw("1 0"),
            Command::raw("40 0"),
            Command::raw("50 0"),
            Command::raw("1 0"),
        ]
    );
    assert!(!services.dispatcher.macros().is_running("D1"));
}

#[tokio::test(start_paused = true)]
async fn test_off_trigger_cancels_running_cycle() {
    let services = make_services();
    services.dispatcher.start_cycle("D1", 60, 5).await.unwrap();
    advance(12).await;
    assert_eq!(commands(&services, "D1").len(), 3);

    services.dispatcher.submit("D1", vec![Command::Off]).await.unwrap();
    advance(120).await;

    let seen = commands(&services, "D1");
    assert_eq!(seen.len(), 8);
    // Everything after the trigger belongs to the OFF sequence.
    assert!(matches!(seen[3], Command::Scene { .. }));
    assert_eq!(seen[7], Command::Off);
    assert_eq!(
        services.dispatcher.macro_status("D1").unwrap().kind,
        Some(MacroKind::OffSequence)
    );
}

#[tokio::test(start_paused = true)]
async fn test_stop_cycle() {
    let services = make_services();
    services.dispatcher.start_cycle("D1", 60, 5).await.unwrap();
    advance(1).await;

    assert!(services.dispatcher.stop_cycle("D1").await.unwrap());
    assert!(!services.dispatcher.stop_cycle("D1").await.unwrap());
    advance(60).await;
    assert_eq!(commands(&services, "D1").len(), 1);
}

#[tokio::test]
async fn test_cycle_bounds_rejected() {
    let services = make_services();
    assert!(services
        .dispatcher
        .start_cycle("D1", 2, 1)
        .await
        .unwrap_err()
        .is_validation());
    assert!(services.dispatcher.start_cycle("D1", 30, 61).await.is_err());
    assert!(!services.dispatcher.macros().is_running("D1"));
}
