//! Event log backend implementations.

pub mod redb;

pub use self::redb::RedbEventLog;
