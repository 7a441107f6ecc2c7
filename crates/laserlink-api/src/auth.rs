//! Admin token authentication.
//!
//! Admin routes require `Authorization: Bearer <token>` matching the
//! configured token. With no token configured they are open.

use axum::{
    extract::State,
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use tracing::warn;

use crate::models::ErrorResponse;
use crate::server::ServerState;

/// Bearer token from the `Authorization` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
}

/// Admin authentication middleware.
pub async fn admin_auth_middleware(
    State(state): State<ServerState>,
    headers: HeaderMap,
    req: axum::extract::Request,
    next: Next,
) -> Result<Response, ErrorResponse> {
    let Some(expected) = state.admin_token() else {
        return Ok(next.run(req).await);
    };

    match bearer_token(&headers) {
        Some(token) if token == expected => Ok(next.run(req).await),
        Some(_) => {
            warn!(
                category = "auth",
                path = %req.uri().path(),
                "Rejected admin request with invalid token"
            );
            Err(ErrorResponse::unauthorized("Invalid admin token"))
        }
        None => Err(ErrorResponse::unauthorized(
            "Authentication required. Provide Authorization: Bearer <token>",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_bearer_token() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer s3cret"));
        assert_eq!(bearer_token(&headers), Some("s3cret"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&headers), None);
    }
}
