//! Core types for laserlink.
//!
//! Defines the pieces every other crate agrees on:
//! - the [`Command`] tagged union and its [`CommandKind`] tags
//! - persisted [`Event`] records
//! - normalization of loosely-typed inbound payloads
//! - [`RelayConfig`] loading
//! - the shared [`Error`] type

pub mod command;
pub mod config;
pub mod error;
pub mod event;

pub use command::{Command, CommandKind, CommandPayload, DeviceStatus, SubmitBody};
pub use config::{MacroConfig, PollConfig, RelayConfig, ScheduleConfig};
pub use error::{Error, Result};
pub use event::{validate_device_id, DeviceId, Event, EventId};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
