//! Route table.

use axum::{
    routing::{delete, get, post},
    Router,
};

use crate::auth::admin_auth_middleware;
use crate::handlers::{commands, devices, health, macros, poll, schedules, telemetry};
use crate::server::state::{ServerState, MAX_REQUEST_BODY_SIZE};

/// Build the application router.
pub fn create_router(state: ServerState) -> Router {
    // Reached by controllers, no credential.
    let public_routes = Router::new()
        .route("/api/health", get(health::health_handler))
        .route("/api/v1/poll", get(poll::poll_handler))
        .route("/api/v1/status", post(telemetry::status_handler));

    let admin_routes = Router::new()
        .route("/api/v1/cmd", post(commands::submit_handler))
        .route("/api/v1/macro", get(macros::macro_status_handler))
        .route("/api/v1/macro/off2/start", post(macros::start_cycle_handler))
        .route("/api/v1/macro/off2/stop", post(macros::stop_cycle_handler))
        .route("/api/v1/devices", get(devices::list_devices_handler))
        .route("/api/v1/events", get(devices::list_events_handler))
        .route(
            "/api/v1/schedules",
            get(schedules::list_rules_handler).put(schedules::upsert_rule_handler),
        )
        .route("/api/v1/schedules/tick", post(schedules::tick_handler))
        .route("/api/v1/schedules/:id", delete(schedules::delete_rule_handler))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            admin_auth_middleware,
        ));

    public_routes
        .merge(admin_routes)
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(tower_http::limit::RequestBodyLimitLayer::new(
            MAX_REQUEST_BODY_SIZE,
        ))
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
        .with_state(state)
}
