//! Common test utilities for API tests.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;

use laserlink_api::{create_router, ServerState};
use laserlink_core::RelayConfig;

pub const TOKEN: &str = "test-token";

/// Server state on temporary storage, schedule loop not started.
pub fn create_test_server_state(auth_token: Option<&str>) -> ServerState {
    let config = RelayConfig {
        auth_token: auth_token.map(String::from),
        ..Default::default()
    };
    ServerState::memory(config).expect("Failed to create server state")
}

pub fn create_test_router(auth_token: Option<&str>) -> (ServerState, Router) {
    let state = create_test_server_state(auth_token);
    let router = create_router(state.clone());
    (state, router)
}

/// Send one request and decode the JSON body (`Value::Null` when empty).
pub async fn send(
    router: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}
