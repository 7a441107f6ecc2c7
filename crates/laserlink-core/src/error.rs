//! Shared error type for laserlink crates.

/// Unified error type for laserlink.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// Invalid input: bad device id, malformed command, out-of-range parameter.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Storage/database errors.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Not found errors.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Serialization/deserialization errors.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether the caller caused the error (and retrying the same input is pointless).
    pub fn is_validation(&self) -> bool {
        matches!(self, Error::Validation(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Storage(e.to_string())
    }
}

/// Result type alias for convenience.
pub type Result<T> = std::result::Result<T, Error>;

/// Shorthand for building a validation error.
#[macro_export]
macro_rules! validation_err {
    ($msg:expr) => {
        $crate::error::Error::Validation($msg.into())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::Error::Validation(format!($fmt, $($arg)*))
    };
}
