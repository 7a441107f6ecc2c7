//! Command dispatch.
//!
//! [`Dispatcher`] is the entry point for every producer. It validates device
//! ids, turns OFF intents into the OFF macro, cancels running macros when a
//! conflicting command arrives, and appends the rest through the shared
//! [`EventWriter`].

use std::sync::Arc;

use serde::Serialize;

use laserlink_core::{validate_device_id, Command, CommandKind, DeviceId, DeviceStatus, Event};

use crate::error::{CommandError, Result};
use crate::macros::{validate_cycle, MacroKind, MacroPlan, MacroSequencer, MacroStatus};
use crate::writer::EventWriter;

/// Result of an operator submission.
#[derive(Debug, Clone, Serialize)]
pub struct SubmitOutcome {
    pub device: DeviceId,
    /// Events actually appended, in id order.
    pub added: Vec<Event>,
    /// Set when an OFF command started the OFF macro.
    #[serde(rename = "macro", skip_serializing_if = "Option::is_none")]
    pub macro_plan: Option<MacroPlan>,
}

/// Single write path for operator, macro, schedule and telemetry producers.
pub struct Dispatcher {
    writer: Arc<EventWriter>,
    macros: Arc<MacroSequencer>,
}

impl Dispatcher {
    pub fn new(writer: Arc<EventWriter>, macros: Arc<MacroSequencer>) -> Self {
        Self { writer, macros }
    }

    pub fn writer(&self) -> &Arc<EventWriter> {
        &self.writer
    }

    pub fn macros(&self) -> &Arc<MacroSequencer> {
        &self.macros
    }

    /// Operator submission.
    ///
    /// OFF is never stored here: when it is the last non-GET command of the
    /// batch it starts the OFF macro. Any non-GET command cancels the running
    /// macro first. Everything except OFF is appended as one batch.
    pub async fn submit(&self, device: &str, commands: Vec<Command>) -> Result<SubmitOutcome> {
        let device = validate_device_id(device)?;
        if commands.is_empty() {
            return Err(CommandError::Validation("no events".to_string()));
        }

        let last_intent = commands
            .iter()
            .rev()
            .map(Command::kind)
            .find(CommandKind::is_actionable);
        let literal: Vec<Command> = commands
            .into_iter()
            .filter(|c| c.kind() != CommandKind::Off)
            .collect();

        let guard = self.writer.lock(&device).await?;
        if last_intent.is_some() {
            self.macros.cancel(&device);
        }
        let added = if literal.is_empty() {
            Vec::new()
        } else {
            guard.append(&literal)?
        };
        let macro_plan = match last_intent {
            Some(CommandKind::Off) => Some(self.macros.start_off(&device)),
            _ => None,
        };
        drop(guard);

        tracing::info!(
            device = %device,
            added = added.len(),
            off_macro = macro_plan.is_some(),
            "Commands submitted"
        );
        Ok(SubmitOutcome {
            device,
            added,
            macro_plan,
        })
    }

    /// Append literal commands for internal producers. OFF is stored as-is;
    /// non-GET commands still cancel the running macro.
    pub async fn emit(&self, device: &str, commands: &[Command]) -> Result<Vec<Event>> {
        let device = validate_device_id(device)?;
        if commands.is_empty() {
            return Err(CommandError::Validation("no events".to_string()));
        }

        let guard = self.writer.lock(&device).await?;
        if commands.iter().any(|c| c.kind().is_actionable()) {
            self.macros.cancel(&device);
        }
        guard.append(commands)
    }

    /// Start the OFF macro without an accompanying submission.
    pub async fn start_off(&self, device: &str) -> Result<MacroPlan> {
        let device = validate_device_id(device)?;
        let _guard = self.writer.lock(&device).await?;
        Ok(self.macros.start_off(&device))
    }

    /// Telemetry from the device itself. Does not cancel a running macro.
    pub async fn report_status(
        &self,
        device: &str,
        status: DeviceStatus,
        deviation: Option<f64>,
    ) -> Result<Event> {
        let device = validate_device_id(device)?;
        if let Some(d) = deviation {
            if !d.is_finite() {
                return Err(CommandError::Validation(
                    "deviation must be a finite number".to_string(),
                ));
            }
        }

        let guard = self.writer.lock(&device).await?;
        let mut events = guard.append(&[Command::Status { status, deviation }])?;
        events
            .pop()
            .ok_or_else(|| CommandError::Internal("status append returned no event".to_string()))
    }

    /// Start the OFF2 cycle after checking its bounds.
    pub async fn start_cycle(
        &self,
        device: &str,
        duration_secs: u64,
        step_secs: u64,
    ) -> Result<MacroPlan> {
        let device = validate_device_id(device)?;
        let (duration, step) = validate_cycle(duration_secs, step_secs)?;
        let _guard = self.writer.lock(&device).await?;
        Ok(self.macros.start_cycle(&device, duration, step))
    }

    /// Stop the OFF2 cycle of `device`. Returns whether one was running; a
    /// running OFF sequence is left alone.
    pub async fn stop_cycle(&self, device: &str) -> Result<bool> {
        let device = validate_device_id(device)?;
        let _guard = self.writer.lock(&device).await?;
        Ok(self.macros.cancel_kind(&device, MacroKind::Cycle))
    }

    pub fn macro_status(&self, device: &str) -> Result<MacroStatus> {
        let device = validate_device_id(device)?;
        Ok(self.macros.status(&device))
    }
}
