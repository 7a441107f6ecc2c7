//! HTTP surface of the laserlink relay.
//!
//! Controllers long-poll `/api/v1/poll` and report telemetry on
//! `/api/v1/status`; operators submit commands, drive macros and manage
//! schedule rules through the admin routes.

pub mod auth;
pub mod handlers;
pub mod models;
pub mod server;
pub mod shutdown;

pub use models::{ApiResult, ErrorResponse};
pub use server::{create_router, run, ServerState, MAX_REQUEST_BODY_SIZE};
