//! Error type for the command path.

use thiserror::Error;

use laserlink_core::Error as CoreError;

/// Errors from submission, polling and macro control.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The caller sent something unusable; never retried.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Append or query failure in the event log.
    #[error(transparent)]
    Storage(#[from] laserlink_storage::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CommandError {
    pub fn is_validation(&self) -> bool {
        matches!(self, CommandError::Validation(_))
    }
}

impl From<CoreError> for CommandError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::Validation(msg) => CommandError::Validation(msg),
            CoreError::Storage(msg) => {
                CommandError::Storage(laserlink_storage::Error::Storage(msg))
            }
            other => CommandError::Internal(other.to_string()),
        }
    }
}

impl From<CommandError> for CoreError {
    fn from(e: CommandError) -> Self {
        match e {
            CommandError::Validation(msg) => CoreError::Validation(msg),
            CommandError::Storage(e) => e.into(),
            CommandError::Internal(msg) => CoreError::Internal(msg),
        }
    }
}

/// Result type for the command path.
pub type Result<T> = std::result::Result<T, CommandError>;
