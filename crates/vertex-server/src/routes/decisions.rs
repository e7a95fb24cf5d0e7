//! Cost decision routes.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use vertex_runtime::{Candidate, DEFAULT_QUALITY_THRESHOLD};

use crate::error::ApiResult;
use crate::extract::{ApiJson, ApiQuery};
use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/decisions", get(history).delete(reset))
        .route("/decisions/evaluate", post(evaluate))
        .route("/decisions/stats", get(stats))
        .route("/decisions/suggestions", get(suggestions))
        .route("/decisions/usage", post(track_usage))
}

#[derive(Deserialize)]
struct EvaluateRequest {
    candidates: Vec<Candidate>,
    #[serde(default)]
    quality_threshold: Option<f64>,
    /// Fail instead of returning a paid fallback.
    #[serde(default)]
    strict: bool,
}

/// POST /api/decisions/evaluate: run the cost policy over caller-supplied candidates.
async fn evaluate(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<EvaluateRequest>,
) -> ApiResult<Json<Value>> {
    let threshold = req.quality_threshold.unwrap_or(DEFAULT_QUALITY_THRESHOLD);
    let decision = state.engine.evaluate(&req.candidates, threshold)?;
    if req.strict {
        decision.ensure_zero_cost()?;
    }
    let status = if decision.degraded { "degraded" } else { "ok" };
    Ok(Json(json!({ "status": status, "decision": decision })))
}

#[derive(Deserialize)]
struct HistoryQuery {
    #[serde(default = "default_history_limit")]
    limit: usize,
}

fn default_history_limit() -> usize {
    50
}

async fn history(
    State(state): State<Arc<AppState>>,
    ApiQuery(q): ApiQuery<HistoryQuery>,
) -> Json<Value> {
    let decisions = state.engine.history(q.limit);
    Json(json!({
        "status": "ok",
        "total": state.engine.len(),
        "decisions": decisions,
    }))
}

async fn stats(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({ "status": "ok", "statistics": state.engine.statistics() }))
}

async fn suggestions(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({ "status": "ok", "suggestions": state.engine.suggest_optimizations() }))
}

#[derive(Deserialize)]
struct UsageRequest {
    tokens: u64,
    #[serde(default)]
    cost_per_1k_tokens: f64,
}

async fn track_usage(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<UsageRequest>,
) -> Json<Value> {
    let record = state.engine.track_usage(req.tokens, req.cost_per_1k_tokens);
    Json(json!({ "status": "ok", "usage": record }))
}

async fn reset(State(state): State<Arc<AppState>>) -> Json<Value> {
    state.engine.reset();
    Json(json!({ "status": "ok" }))
}
