//! Unified error handling for the API.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use std::fmt;

use laserlink_commands::CommandError;
use laserlink_core::Error as CoreError;
use laserlink_rules::RuleError;

/// API error response with its HTTP status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
    #[serde(skip)]
    pub status: StatusCode,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>, status: StatusCode) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            status,
        }
    }

    /// Bad request (400). Malformed device or command input.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new("BAD_REQUEST", message, StatusCode::BAD_REQUEST)
    }

    /// Unauthorized (401).
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("UNAUTHORIZED", message, StatusCode::UNAUTHORIZED)
    }

    /// Not found (404).
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::new(
            "NOT_FOUND",
            format!("{} not found", resource.into()),
            StatusCode::NOT_FOUND,
        )
    }

    /// Validation error (422). Rejected schedule rules.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(
            "VALIDATION_ERROR",
            message,
            StatusCode::UNPROCESSABLE_ENTITY,
        )
    }

    /// Internal server error (500).
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new("INTERNAL_ERROR", message, StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> Response {
        let status = self.status;
        let body = serde_json::json!({
            "ok": false,
            "success": false,
            "error": {
                "code": self.code,
                "message": self.message,
            }
        });
        (status, axum::Json(body)).into_response()
    }
}

impl fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for ErrorResponse {}

impl From<anyhow::Error> for ErrorResponse {
    fn from(e: anyhow::Error) -> Self {
        Self::internal(e.to_string())
    }
}

impl From<CoreError> for ErrorResponse {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::Validation(msg) => Self::bad_request(msg),
            CoreError::NotFound(what) => Self::not_found(what),
            other => {
                tracing::error!(error = %other, "Request failed");
                Self::internal(other.to_string())
            }
        }
    }
}

impl From<CommandError> for ErrorResponse {
    fn from(e: CommandError) -> Self {
        match e {
            CommandError::Validation(msg) => Self::bad_request(msg),
            CommandError::Storage(inner) => inner.into(),
            other => {
                tracing::error!(error = %other, "Command path failed");
                Self::internal(other.to_string())
            }
        }
    }
}

impl From<laserlink_storage::Error> for ErrorResponse {
    fn from(e: laserlink_storage::Error) -> Self {
        match e {
            laserlink_storage::Error::InvalidInput(msg) => Self::bad_request(msg),
            other => {
                tracing::error!(error = %other, "Event log access failed");
                Self::internal(other.to_string())
            }
        }
    }
}

impl From<RuleError> for ErrorResponse {
    fn from(e: RuleError) -> Self {
        match e {
            RuleError::Validation(msg) => Self::validation(msg),
            RuleError::NotFound(id) => Self::not_found(format!("Schedule rule {}", id)),
            RuleError::Dispatch(inner) => inner.into(),
            other => {
                tracing::error!(error = %other, "Schedule operation failed");
                Self::internal(other.to_string())
            }
        }
    }
}

/// Result type alias for API handlers.
pub type ApiResult<T> = Result<T, ErrorResponse>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_errors_map_to_status() {
        let err: ErrorResponse = CommandError::Validation("device required".into()).into();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.code, "BAD_REQUEST");

        let err: ErrorResponse =
            CommandError::Storage(laserlink_storage::Error::Storage("disk".into())).into();
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_rule_errors_map_to_status() {
        let err: ErrorResponse = RuleError::Validation("window start".into()).into();
        assert_eq!(err.status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(err.code, "VALIDATION_ERROR");

        let err: ErrorResponse = RuleError::NotFound(7).into();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
        assert_eq!(err.message, "Schedule rule 7 not found");
    }

    #[test]
    fn test_display() {
        let err = ErrorResponse::unauthorized("missing token");
        assert_eq!(err.to_string(), "[UNAUTHORIZED] missing token");
    }
}
