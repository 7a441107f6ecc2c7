//! Schedule rule management.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;

use laserlink_rules::{ScheduleRule, ScheduleRuleInput, TickReport};

use super::{HandlerResult, ServerState};

#[derive(Debug, Serialize)]
pub struct RulesResponse {
    pub timezone: String,
    pub rules: Vec<ScheduleRule>,
}

#[derive(Debug, Serialize)]
pub struct RuleResponse {
    pub ok: bool,
    pub rule: ScheduleRule,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub ok: bool,
    pub id: u64,
}

#[derive(Debug, Serialize)]
pub struct TickResponse {
    pub ok: bool,
    #[serde(flatten)]
    pub report: TickReport,
}

pub async fn list_rules_handler(State(state): State<ServerState>) -> HandlerResult<RulesResponse> {
    let rules = state.schedules.store().list()?;
    Ok(Json(RulesResponse {
        timezone: state.schedules.timezone().name().to_string(),
        rules,
    }))
}

/// Create a rule, or replace the one named by `id`.
pub async fn upsert_rule_handler(
    State(state): State<ServerState>,
    Json(input): Json<ScheduleRuleInput>,
) -> HandlerResult<RuleResponse> {
    let rule = state.schedules.store().upsert(input)?;
    Ok(Json(RuleResponse { ok: true, rule }))
}

pub async fn delete_rule_handler(
    State(state): State<ServerState>,
    Path(id): Path<u64>,
) -> HandlerResult<DeleteResponse> {
    state.schedules.store().delete(id)?;
    Ok(Json(DeleteResponse { ok: true, id }))
}

/// Evaluate the rules now instead of waiting for the next tick.
pub async fn tick_handler(State(state): State<ServerState>) -> HandlerResult<TickResponse> {
    let report = state.schedules.tick().await?;
    Ok(Json(TickResponse { ok: true, report }))
}
