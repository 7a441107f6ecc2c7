//! Shared handler helpers.

use axum::Json;
use serde::Deserialize;

use laserlink_core::{validate_device_id, DeviceId, EventId};

use crate::models::ErrorResponse;

pub type HandlerResult<T> = Result<Json<T>, ErrorResponse>;

/// `?device=` on device-scoped routes.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeviceQuery {
    #[serde(default)]
    pub device: Option<String>,
}

impl DeviceQuery {
    pub fn require(&self) -> Result<DeviceId, ErrorResponse> {
        require_device(self.device.as_deref())
    }
}

/// Validated device id, 400 when absent or malformed.
pub fn require_device(raw: Option<&str>) -> Result<DeviceId, ErrorResponse> {
    match raw.map(str::trim) {
        None | Some("") => Err(ErrorResponse::bad_request("device required")),
        Some(device) => Ok(validate_device_id(device)?),
    }
}

/// Lenient cursor parsing: missing or unparsable means "from the start".
pub fn parse_cursor(raw: Option<&str>) -> EventId {
    raw.and_then(|c| c.trim().parse().ok()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_device() {
        assert_eq!(require_device(Some(" D1 ")).unwrap(), "D1");
        assert!(require_device(None).is_err());
        assert!(require_device(Some("   ")).is_err());
    }

    #[test]
    fn test_parse_cursor() {
        assert_eq!(parse_cursor(Some("42")), 42);
        assert_eq!(parse_cursor(Some(" 7 ")), 7);
        assert_eq!(parse_cursor(Some("abc")), 0);
        assert_eq!(parse_cursor(None), 0);
    }
}
