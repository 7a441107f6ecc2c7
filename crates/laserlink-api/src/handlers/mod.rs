//! HTTP handlers.

pub mod commands;
pub mod common;
pub mod devices;
pub mod health;
pub mod macros;
pub mod poll;
pub mod schedules;
pub mod telemetry;

pub use crate::server::ServerState;
pub use common::{DeviceQuery, HandlerResult};
