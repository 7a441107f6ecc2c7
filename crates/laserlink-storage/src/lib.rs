//! Durable storage for laserlink.
//!
//! The [`EventLog`] trait is the narrow interface the relay core reads and
//! writes through; [`RedbEventLog`] implements it on the redb embedded
//! database.

pub mod backends;
pub mod error;
pub mod event_log;

pub use backends::RedbEventLog;
pub use error::{Error, Result};
pub use event_log::{DeviceSummary, EventLog};
