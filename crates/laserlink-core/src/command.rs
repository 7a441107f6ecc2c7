//! Controller command model.
//!
//! Commands travel as JSON objects tagged by a `cmd` field. Each kind carries
//! only the fields it uses; inbound payloads are normalized through
//! [`CommandPayload`] so unknown kinds and missing fields are rejected at the
//! boundary instead of being stored.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::validation_err;

/// Command kind tag, independent of payload fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommandKind {
    #[serde(rename = "SCENE")]
    Scene,
    #[serde(rename = "OFF")]
    Off,
    #[serde(rename = "RAW")]
    Raw,
    #[serde(rename = "UNO")]
    Uno,
    #[serde(rename = "W")]
    W,
    #[serde(rename = "WMIN")]
    WMin,
    #[serde(rename = "WMAX")]
    WMax,
    #[serde(rename = "CALL")]
    Call,
    #[serde(rename = "HANG")]
    Hang,
    #[serde(rename = "SIM_ON")]
    SimOn,
    #[serde(rename = "SIM_TOGGLE")]
    SimToggle,
    #[serde(rename = "STATUS")]
    Status,
    #[serde(rename = "GET")]
    Get,
}

impl CommandKind {
    /// All kinds, in wire-documentation order.
    pub const ALL: [CommandKind; 13] = [
        CommandKind::Scene,
        CommandKind::Off,
        CommandKind::Raw,
        CommandKind::Uno,
        CommandKind::W,
        CommandKind::WMin,
        CommandKind::WMax,
        CommandKind::Call,
        CommandKind::Hang,
        CommandKind::SimOn,
        CommandKind::SimToggle,
        CommandKind::Status,
        CommandKind::Get,
    ];

    /// Wire name of the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandKind::Scene => "SCENE",
            CommandKind::Off => "OFF",
            CommandKind::Raw => "RAW",
            CommandKind::Uno => "UNO",
            CommandKind::W => "W",
            CommandKind::WMin => "WMIN",
            CommandKind::WMax => "WMAX",
            CommandKind::Call => "CALL",
            CommandKind::Hang => "HANG",
            CommandKind::SimOn => "SIM_ON",
            CommandKind::SimToggle => "SIM_TOGGLE",
            CommandKind::Status => "STATUS",
            CommandKind::Get => "GET",
        }
    }

    /// Parse a kind name, ignoring case and surrounding whitespace.
    pub fn parse(name: &str) -> Option<Self> {
        let upper = name.trim().to_uppercase();
        Self::ALL.into_iter().find(|k| k.as_str() == upper)
    }

    /// Liveness pings are stored but never handed to pollers.
    pub fn is_actionable(&self) -> bool {
        !matches!(self, CommandKind::Get)
    }
}

impl std::fmt::Display for CommandKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Self-reported controller status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceStatus {
    #[serde(rename = "ON")]
    On,
    #[serde(rename = "OFF")]
    Off,
}

impl DeviceStatus {
    /// Normalize a reported status string.
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_uppercase().as_str() {
            "ON" => Ok(DeviceStatus::On),
            "OFF" => Ok(DeviceStatus::Off),
            other => Err(validation_err!("status must be ON or OFF, got '{}'", other)),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceStatus::On => "ON",
            DeviceStatus::Off => "OFF",
        }
    }
}

/// A validated controller command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd")]
pub enum Command {
    /// Activate a scene. `args` holds the scene number plus optional extras.
    #[serde(rename = "SCENE")]
    Scene {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        args: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        val: Option<i64>,
    },
    #[serde(rename = "OFF")]
    Off,
    /// Raw hardware line.
    #[serde(rename = "RAW")]
    Raw { raw: String },
    /// Passthrough to the auxiliary microcontroller.
    #[serde(rename = "UNO")]
    Uno { raw: String },
    #[serde(rename = "W")]
    W { val: f64 },
    #[serde(rename = "WMIN")]
    WMin { val: f64 },
    #[serde(rename = "WMAX")]
    WMax { val: f64 },
    /// Dial a phone-like target through the GSM module.
    #[serde(rename = "CALL")]
    Call { num: String },
    #[serde(rename = "HANG")]
    Hang,
    #[serde(rename = "SIM_ON")]
    SimOn,
    #[serde(rename = "SIM_TOGGLE")]
    SimToggle {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pulse_ms: Option<u64>,
    },
    /// Telemetry report from the controller itself.
    #[serde(rename = "STATUS")]
    Status {
        status: DeviceStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        deviation: Option<f64>,
    },
    /// Liveness ping.
    #[serde(rename = "GET")]
    Get,
}

impl Command {
    pub fn kind(&self) -> CommandKind {
        match self {
            Command::Scene { .. } => CommandKind::Scene,
            Command::Off => CommandKind::Off,
            Command::Raw { .. } => CommandKind::Raw,
            Command::Uno { .. } => CommandKind::Uno,
            Command::W { .. } => CommandKind::W,
            Command::WMin { .. } => CommandKind::WMin,
            Command::WMax { .. } => CommandKind::WMax,
            Command::Call { .. } => CommandKind::Call,
            Command::Hang => CommandKind::Hang,
            Command::SimOn => CommandKind::SimOn,
            Command::SimToggle { .. } => CommandKind::SimToggle,
            Command::Status { .. } => CommandKind::Status,
            Command::Get => CommandKind::Get,
        }
    }

    /// Scene activation with the given argument string.
    pub fn scene(args: impl Into<String>) -> Self {
        Command::Scene {
            args: Some(args.into()),
            val: None,
        }
    }

    pub fn raw(line: impl Into<String>) -> Self {
        Command::Raw { raw: line.into() }
    }
}

/// Loosely-typed command as submitted by operators and controllers.
///
/// Every field is optional here; [`Command::try_from`] decides which ones the
/// kind requires.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommandPayload {
    #[serde(default)]
    pub cmd: Option<String>,
    #[serde(default)]
    pub args: Option<String>,
    #[serde(default)]
    pub val: Option<f64>,
    #[serde(default)]
    pub num: Option<String>,
    #[serde(default)]
    pub raw: Option<String>,
    #[serde(default)]
    pub pulse_ms: Option<u64>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub deviation: Option<f64>,
}

impl CommandPayload {
    /// Payload with only the kind set.
    pub fn of_kind(cmd: impl Into<String>) -> Self {
        Self {
            cmd: Some(cmd.into()),
            ..Default::default()
        }
    }
}

fn required<T>(value: Option<T>, kind: CommandKind, field: &str) -> Result<T> {
    value.ok_or_else(|| validation_err!("{} requires '{}'", kind, field))
}

fn required_text(value: Option<String>, kind: CommandKind, field: &str) -> Result<String> {
    let text = required(value, kind, field)?;
    if text.trim().is_empty() {
        return Err(validation_err!("{} requires a non-empty '{}'", kind, field));
    }
    Ok(text)
}

fn finite(value: f64, kind: CommandKind) -> Result<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(validation_err!("{} value must be a finite number", kind))
    }
}

impl TryFrom<CommandPayload> for Command {
    type Error = Error;

    fn try_from(payload: CommandPayload) -> Result<Self> {
        let name = payload.cmd.unwrap_or_default();
        if name.trim().is_empty() {
            return Err(validation_err!("command kind 'cmd' is required"));
        }
        let kind = CommandKind::parse(&name)
            .ok_or_else(|| validation_err!("unknown command kind '{}'", name.trim()))?;

        let command = match kind {
            CommandKind::Scene => {
                let val = match payload.val {
                    Some(v) if v.fract() == 0.0 && v.is_finite() => Some(v as i64),
                    Some(v) => return Err(validation_err!("SCENE val must be an integer, got {}", v)),
                    None => None,
                };
                Command::Scene {
                    args: payload.args.map(|a| a.trim().to_string()).filter(|a| !a.is_empty()),
                    val,
                }
            }
            CommandKind::Off => Command::Off,
            CommandKind::Raw => Command::Raw {
                raw: required_text(payload.raw, kind, "raw")?,
            },
            CommandKind::Uno => Command::Uno {
                raw: required_text(payload.raw, kind, "raw")?,
            },
            CommandKind::W => Command::W {
                val: finite(required(payload.val, kind, "val")?, kind)?,
            },
            CommandKind::WMin => Command::WMin {
                val: finite(required(payload.val, kind, "val")?, kind)?,
            },
            CommandKind::WMax => Command::WMax {
                val: finite(required(payload.val, kind, "val")?, kind)?,
            },
            CommandKind::Call => Command::Call {
                num: required_text(payload.num, kind, "num")?.trim().to_string(),
            },
            CommandKind::Hang => Command::Hang,
            CommandKind::SimOn => Command::SimOn,
            CommandKind::SimToggle => Command::SimToggle {
                pulse_ms: payload.pulse_ms,
            },
            CommandKind::Status => Command::Status {
                status: DeviceStatus::parse(&required_text(payload.status, kind, "status")?)?,
                deviation: match payload.deviation {
                    Some(d) => Some(finite(d, kind)?),
                    None => None,
                },
            },
            CommandKind::Get => Command::Get,
        };
        Ok(command)
    }
}

/// Body of a command submission: one command, a bare array, or `{ "events": [...] }`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SubmitBody {
    Batch(Vec<CommandPayload>),
    Wrapped { events: Vec<CommandPayload> },
    Single(CommandPayload),
}

impl SubmitBody {
    /// Normalize every entry, failing on the first invalid one.
    pub fn into_commands(self) -> Result<Vec<Command>> {
        let payloads = match self {
            SubmitBody::Batch(items) => items,
            SubmitBody::Wrapped { events } => events,
            SubmitBody::Single(item) => vec![item],
        };
        if payloads.is_empty() {
            return Err(validation_err!("no events"));
        }
        payloads.into_iter().map(Command::try_from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: serde_json::Value) -> Result<Vec<Command>> {
        let body: SubmitBody = serde_json::from_value(value).unwrap();
        body.into_commands()
    }

    #[test]
    fn test_kind_parse_is_case_insensitive() {
        assert_eq!(CommandKind::parse(" scene "), Some(CommandKind::Scene));
        assert_eq!(CommandKind::parse("sim_toggle"), Some(CommandKind::SimToggle));
        assert_eq!(CommandKind::parse("wmax"), Some(CommandKind::WMax));
        assert_eq!(CommandKind::parse("DANCE"), None);
    }

    #[test]
    fn test_single_body() {
        let cmds = parse(json!({"cmd": "scene", "args": "3 80"})).unwrap();
        assert_eq!(
            cmds,
            vec![Command::Scene {
                args: Some("3 80".to_string()),
                val: None
            }]
        );
    }

    #[test]
    fn test_batch_and_wrapped_bodies() {
        let batch = parse(json!([{"cmd": "W", "val": 12}, {"cmd": "hang"}])).unwrap();
        assert_eq!(batch, vec![Command::W { val: 12.0 }, Command::Hang]);

        let wrapped = parse(json!({"events": [{"cmd": "RAW", "raw": "1 0"}]})).unwrap();
        assert_eq!(wrapped, vec![Command::raw("1 0")]);
    }

    #[test]
    fn test_empty_batch_rejected() {
        let err = parse(json!({"events": []})).unwrap_err();
        assert!(err.is_validation());
        assert!(parse(json!([])).is_err());
    }

    #[test]
    fn test_unknown_and_missing_kind_rejected() {
        assert!(parse(json!({"cmd": "LASER_MAX"})).unwrap_err().is_validation());
        assert!(parse(json!({"val": 3})).unwrap_err().is_validation());
    }

    #[test]
    fn test_required_fields() {
        assert!(parse(json!({"cmd": "RAW"})).is_err());
        assert!(parse(json!({"cmd": "RAW", "raw": "   "})).is_err());
        assert!(parse(json!({"cmd": "W"})).is_err());
        assert!(parse(json!({"cmd": "CALL"})).is_err());
        assert!(parse(json!({"cmd": "SCENE", "val": 1.5})).is_err());
    }

    #[test]
    fn test_status_normalization() {
        let cmds = parse(json!({"cmd": "status", "status": " on ", "deviation": 0.25})).unwrap();
        assert_eq!(
            cmds,
            vec![Command::Status {
                status: DeviceStatus::On,
                deviation: Some(0.25)
            }]
        );
        assert!(parse(json!({"cmd": "STATUS", "status": "maybe"})).is_err());
    }

    #[test]
    fn test_wire_format() {
        let value = serde_json::to_value(Command::Off).unwrap();
        assert_eq!(value, json!({"cmd": "OFF"}));

        let value = serde_json::to_value(Command::Scene {
            args: Some("1".to_string()),
            val: Some(1),
        })
        .unwrap();
        assert_eq!(value, json!({"cmd": "SCENE", "args": "1", "val": 1}));

        let value = serde_json::to_value(Command::SimToggle { pulse_ms: None }).unwrap();
        assert_eq!(value, json!({"cmd": "SIM_TOGGLE"}));
    }
}
