//! Seat assignment and unload routes.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use vertex_runtime::{AssignRequest, AssignResponse};

use super::blocking;
use crate::error::ApiResult;
use crate::extract::{ApiJson, ApiPath};
use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/seats/assign", post(assign))
        .route("/seats", get(list_seats).delete(unload_all))
        .route("/seats/{id}", get(get_seat).delete(unload_seat))
}

/// POST /api/seats/assign: bind a seat to the best free model for a task.
async fn assign(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<AssignRequest>,
) -> ApiResult<(StatusCode, Json<AssignResponse>)> {
    let seats = state.seats.clone();
    let response = blocking(move || seats.handle_assign(&req)).await?;
    let code = match &response {
        AssignResponse::Assigned(_) => StatusCode::OK,
        AssignResponse::Rejected { .. } => StatusCode::UNPROCESSABLE_ENTITY,
    };
    Ok((code, Json(response)))
}

async fn list_seats(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "seats": state.seats.status_all(),
        "pool": state.seats.model_stats(),
    }))
}

async fn get_seat(
    State(state): State<Arc<AppState>>,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<Json<Value>> {
    let seat = state.seats.status(id)?;
    Ok(Json(json!({ "status": "ok", "seat": seat })))
}

async fn unload_seat(
    State(state): State<Arc<AppState>>,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<Json<Value>> {
    let unloaded = state.seats.unload_seat(id)?;
    Ok(Json(json!({ "status": "ok", "seat_id": id, "unloaded": unloaded })))
}

async fn unload_all(State(state): State<Arc<AppState>>) -> Json<Value> {
    let unloaded = state.seats.unload_all();
    Json(json!({ "status": "ok", "unloaded": unloaded }))
}
