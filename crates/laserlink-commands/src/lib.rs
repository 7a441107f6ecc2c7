//! Command path of the laserlink relay.
//!
//! Provides:
//! - per-device runtimes with a tail cache and parked pollers
//! - long-poll delivery
//! - the OFF and OFF2 macros
//! - the dispatcher every producer writes through

pub mod dispatcher;
pub mod error;
pub mod macros;
pub mod poll;
pub mod runtime;
pub mod services;
pub mod writer;

pub use dispatcher::{Dispatcher, SubmitOutcome};
pub use error::{CommandError, Result};
pub use macros::{MacroKind, MacroPlan, MacroSequencer, MacroState, MacroStatus};
pub use poll::{LongPollCoordinator, PollOutcome};
pub use runtime::{Delivery, DeviceRegistry, DeviceRuntime, RuntimeSnapshot};
pub use services::RelayServices;
pub use writer::{DeviceWriteGuard, EventWriter};
