//! Error types for the rules crate.

pub use laserlink_core::error::Error as CoreError;

use laserlink_commands::CommandError;

#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Rule not found: {0}")]
    NotFound(u64),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Applying a decision through the dispatcher failed.
    #[error("Dispatch error: {0}")]
    Dispatch(#[from] CommandError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RuleError {
    pub fn is_validation(&self) -> bool {
        matches!(self, RuleError::Validation(_))
    }
}

/// Result type for rule operations
pub type Result<T> = std::result::Result<T, RuleError>;

impl From<RuleError> for CoreError {
    fn from(e: RuleError) -> Self {
        match e {
            RuleError::Validation(s) => CoreError::Validation(s),
            RuleError::NotFound(id) => CoreError::NotFound(format!("schedule rule {}", id)),
            RuleError::Storage(s) => CoreError::Storage(s),
            RuleError::Serialization(s) => CoreError::Serialization(s),
            RuleError::Dispatch(e) => e.into(),
            RuleError::Io(e) => CoreError::Storage(e.to_string()),
        }
    }
}

impl From<CoreError> for RuleError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::Validation(s) => RuleError::Validation(s),
            CoreError::Serialization(s) => RuleError::Serialization(s),
            other => RuleError::Storage(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for RuleError {
    fn from(e: serde_json::Error) -> Self {
        RuleError::Serialization(e.to_string())
    }
}

impl From<redb::TransactionError> for RuleError {
    fn from(e: redb::TransactionError) -> Self {
        RuleError::Storage(format!("Redb transaction error: {}", e))
    }
}

impl From<redb::TableError> for RuleError {
    fn from(e: redb::TableError) -> Self {
        RuleError::Storage(format!("Redb table error: {}", e))
    }
}

impl From<redb::StorageError> for RuleError {
    fn from(e: redb::StorageError) -> Self {
        RuleError::Storage(format!("Redb storage error: {}", e))
    }
}

impl From<redb::CommitError> for RuleError {
    fn from(e: redb::CommitError) -> Self {
        RuleError::Storage(format!("Redb commit error: {}", e))
    }
}

impl From<redb::DatabaseError> for RuleError {
    fn from(e: redb::DatabaseError) -> Self {
        RuleError::Storage(format!("Redb database error: {}", e))
    }
}
