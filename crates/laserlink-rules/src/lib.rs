//! Time-window scheduling for laserlink.
//!
//! Rules ([`ScheduleRule`]) are stored in redb by [`ScheduleRuleStore`]. The
//! [`ScheduleEngine`] evaluates them periodically and drives each device to
//! its scene or off state through the command dispatcher.

pub mod engine;
pub mod error;
pub mod rule;
pub mod store;

pub use engine::{decide, minute_of_day, Decision, ScheduleEngine, TickReport};
pub use error::{Result, RuleError};
pub use rule::{window_contains, OffMode, ScheduleRule, ScheduleRuleInput};
pub use store::ScheduleRuleStore;
