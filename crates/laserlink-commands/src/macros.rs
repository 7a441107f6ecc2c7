//! Timed, cancellable command macros.
//!
//! Two macros exist, and at most one runs per device:
//! - `OFF_SEQUENCE`: five fixed steps (scene, three raw resets, OFF)
//! - `OFF2`: a three-command raw pattern repeated every `step` until `duration` elapses
//!
//! Each run is a spawned task watching a [`CancellationToken`]. A step takes
//! the device write lock and re-checks the token before appending, so a
//! cancellation issued under that lock suppresses every later step.

use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use laserlink_core::{Command, DeviceId, MacroConfig};

use crate::error::{CommandError, Result};
use crate::writer::EventWriter;

/// Raw reset lines sent by both macros, in order.
pub const RESET_PATTERN: [&str; 3] = ["1 0", "40 0", "50 0"];

/// Accepted OFF2 duration, seconds.
pub const CYCLE_DURATION_SECS: RangeInclusive<u64> = 3..=600;

/// Accepted OFF2 step interval, seconds.
pub const CYCLE_STEP_SECS: RangeInclusive<u64> = 1..=60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MacroKind {
    #[serde(rename = "OFF_SEQUENCE")]
    OffSequence,
    #[serde(rename = "OFF2")]
    Cycle,
}

impl MacroKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MacroKind::OffSequence => "OFF_SEQUENCE",
            MacroKind::Cycle => "OFF2",
        }
    }
}

/// Lifecycle of one macro run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "step", rename_all = "snake_case")]
pub enum MacroState {
    Idle,
    RunningStep(usize),
    Completed,
    Cancelled,
}

impl MacroState {
    pub fn is_finished(&self) -> bool {
        matches!(self, MacroState::Completed | MacroState::Cancelled)
    }
}

/// Description of a started macro, returned to whoever triggered it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MacroPlan {
    pub kind: MacroKind,
    pub device: DeviceId,
    pub started_at: DateTime<Utc>,
    /// Step offsets of the OFF sequence.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule_sec: Option<Vec<u64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_sec: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_sec: Option<u64>,
}

/// Current macro of a device.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MacroStatus {
    pub device: DeviceId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<MacroKind>,
    #[serde(flatten)]
    pub state: MacroState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
}

struct ActiveMacro {
    run: u64,
    plan: MacroPlan,
    token: CancellationToken,
    state: Arc<Mutex<MacroState>>,
}

/// Owns the macro task of every device.
pub struct MacroSequencer {
    writer: Arc<EventWriter>,
    config: MacroConfig,
    active: DashMap<DeviceId, ActiveMacro>,
    next_run: AtomicU64,
}

/// Check OFF2 parameters and convert them to durations.
pub fn validate_cycle(duration_secs: u64, step_secs: u64) -> Result<(Duration, Duration)> {
    if !CYCLE_DURATION_SECS.contains(&duration_secs) {
        return Err(CommandError::Validation(format!(
            "duration must be between {} and {} seconds",
            CYCLE_DURATION_SECS.start(),
            CYCLE_DURATION_SECS.end()
        )));
    }
    if !CYCLE_STEP_SECS.contains(&step_secs) {
        return Err(CommandError::Validation(format!(
            "step must be between {} and {} seconds",
            CYCLE_STEP_SECS.start(),
            CYCLE_STEP_SECS.end()
        )));
    }
    Ok((
        Duration::from_secs(duration_secs),
        Duration::from_secs(step_secs),
    ))
}

impl MacroSequencer {
    pub fn new(writer: Arc<EventWriter>, config: MacroConfig) -> Self {
        Self {
            writer,
            config,
            active: DashMap::new(),
            next_run: AtomicU64::new(1),
        }
    }

    /// Steps of the OFF sequence as (offset, command).
    pub fn off_steps(&self) -> Vec<(Duration, Command)> {
        let spacing = Duration::from_secs(self.config.off_step_secs);
        let scene = Command::Scene {
            args: Some(self.config.off_scene.clone()),
            val: self.config.off_scene.trim().parse().ok(),
        };
        let mut commands = vec![scene];
        commands.extend(RESET_PATTERN.iter().map(|line| Command::raw(*line)));
        commands.push(Command::Off);

        commands
            .into_iter()
            .enumerate()
            .map(|(n, command)| (spacing * n as u32, command))
            .collect()
    }

    /// Start the OFF sequence, replacing any macro running for `device`.
    ///
    /// Callers hold the device write lock.
    pub fn start_off(&self, device: &str) -> MacroPlan {
        let steps = self.off_steps();
        let plan = MacroPlan {
            kind: MacroKind::OffSequence,
            device: device.to_string(),
            started_at: Utc::now(),
            schedule_sec: Some(steps.iter().map(|(offset, _)| offset.as_secs()).collect()),
            duration_sec: None,
            step_sec: None,
        };

        let (token, state) = self.install(device, plan.clone());
        let writer = self.writer.clone();
        let device = device.to_string();
        tokio::spawn(async move {
            run_sequence(writer, device, steps, token, state).await;
        });
        plan
    }

    /// Start the OFF2 cycle, replacing any macro running for `device`.
    ///
    /// Callers hold the device write lock.
    pub fn start_cycle(&self, device: &str, duration: Duration, step: Duration) -> MacroPlan {
        let plan = MacroPlan {
            kind: MacroKind::Cycle,
            device: device.to_string(),
            started_at: Utc::now(),
            schedule_sec: None,
            duration_sec: Some(duration.as_secs()),
            step_sec: Some(step.as_secs()),
        };

        let (token, state) = self.install(device, plan.clone());
        let writer = self.writer.clone();
        let device = device.to_string();
        tokio::spawn(async move {
            run_cycle(writer, device, duration, step, token, state).await;
        });
        plan
    }

    fn install(&self, device: &str, plan: MacroPlan) -> (CancellationToken, Arc<Mutex<MacroState>>) {
        self.cancel(device);

        let run = self.next_run.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        let state = Arc::new(Mutex::new(MacroState::Idle));
        tracing::info!(
            category = "macro",
            device = %device,
            kind = plan.kind.as_str(),
            run,
            "Macro started"
        );
        self.active.insert(
            device.to_string(),
            ActiveMacro {
                run,
                plan,
                token: token.clone(),
                state: state.clone(),
            },
        );
        (token, state)
    }

    /// Cancel the running macro of `device`. Returns whether one was running.
    ///
    /// Idempotent. Callers hold the device write lock so no step of the
    /// cancelled run can land afterwards.
    pub fn cancel(&self, device: &str) -> bool {
        self.cancel_matching(device, None)
    }

    /// Cancel only when the running macro is of `kind`.
    pub fn cancel_kind(&self, device: &str, kind: MacroKind) -> bool {
        self.cancel_matching(device, Some(kind))
    }

    fn cancel_matching(&self, device: &str, kind: Option<MacroKind>) -> bool {
        let Some(active) = self.active.get(device) else {
            return false;
        };
        if kind.is_some_and(|k| k != active.plan.kind) {
            return false;
        }
        let mut state = active.state.lock();
        if state.is_finished() {
            return false;
        }
        *state = MacroState::Cancelled;
        active.token.cancel();
        tracing::info!(
            category = "macro",
            device = %device,
            kind = active.plan.kind.as_str(),
            run = active.run,
            "Macro cancelled"
        );
        true
    }

    pub fn is_running(&self, device: &str) -> bool {
        self.active
            .get(device)
            .map(|a| !a.state.lock().is_finished())
            .unwrap_or(false)
    }

    /// Latest macro of `device`, `Idle` when none ever ran.
    pub fn status(&self, device: &str) -> MacroStatus {
        match self.active.get(device) {
            Some(active) => MacroStatus {
                device: device.to_string(),
                kind: Some(active.plan.kind),
                state: *active.state.lock(),
                started_at: Some(active.plan.started_at),
            },
            None => MacroStatus {
                device: device.to_string(),
                kind: None,
                state: MacroState::Idle,
                started_at: None,
            },
        }
    }

    /// Cancel every running macro.
    pub fn shutdown(&self) {
        for entry in self.active.iter() {
            let mut state = entry.state.lock();
            if !state.is_finished() {
                *state = MacroState::Cancelled;
            }
            entry.token.cancel();
        }
    }
}

async fn run_sequence(
    writer: Arc<EventWriter>,
    device: DeviceId,
    steps: Vec<(Duration, Command)>,
    token: CancellationToken,
    state: Arc<Mutex<MacroState>>,
) {
    let start = Instant::now();
    for (n, (offset, command)) in steps.iter().enumerate() {
        tokio::select! {
            biased;
            _ = token.cancelled() => return,
            _ = tokio::time::sleep_until(start + *offset) => {}
        }
        if !fire_step(&writer, &device, n, command, &token, &state).await {
            return;
        }
    }
    finish(&device, &state);
}

async fn run_cycle(
    writer: Arc<EventWriter>,
    device: DeviceId,
    duration: Duration,
    step: Duration,
    token: CancellationToken,
    state: Arc<Mutex<MacroState>>,
) {
    let start = Instant::now();
    let deadline = start + duration;
    let mut ticker = tokio::time::interval_at(start, step);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut n = 0usize;
    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => return,
            _ = tokio::time::sleep_until(deadline) => break,
            _ = ticker.tick() => {}
        }
        if Instant::now() >= deadline {
            break;
        }
        let command = Command::raw(RESET_PATTERN[n % RESET_PATTERN.len()]);
        if !fire_step(&writer, &device, n, &command, &token, &state).await {
            return;
        }
        n += 1;
    }
    finish(&device, &state);
}

/// Append one step. Returns `false` once the run has been cancelled.
async fn fire_step(
    writer: &EventWriter,
    device: &str,
    n: usize,
    command: &Command,
    token: &CancellationToken,
    state: &Mutex<MacroState>,
) -> bool {
    let guard = match writer.lock(device).await {
        Ok(guard) => guard,
        Err(e) => {
            tracing::warn!(category = "macro", device = %device, step = n, error = %e, "Macro step skipped");
            return !token.is_cancelled();
        }
    };
    if token.is_cancelled() {
        return false;
    }
    *state.lock() = MacroState::RunningStep(n);

    match guard.append(std::slice::from_ref(command)) {
        Ok(events) => tracing::debug!(
            category = "macro",
            device = %device,
            step = n,
            cmd = %command.kind(),
            event_id = events.first().map(|e| e.id).unwrap_or_default(),
            "Macro step fired"
        ),
        Err(e) => tracing::warn!(
            category = "macro",
            device = %device,
            step = n,
            cmd = %command.kind(),
            error = %e,
            "Macro step failed"
        ),
    }
    true
}

fn finish(device: &str, state: &Mutex<MacroState>) {
    let mut state = state.lock();
    if !state.is_finished() {
        *state = MacroState::Completed;
        tracing::info!(category = "macro", device = %device, "Macro completed");
    }
}
