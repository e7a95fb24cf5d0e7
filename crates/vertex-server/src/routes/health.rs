//! Health and activity routes.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde_json::{json, Value};
use tracing::warn;

use super::blocking;
use crate::error::ApiError;
use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health))
        .route("/activity", get(activity))
        .route("/activity/touch", post(touch))
}

async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    let catalog = state.catalog.clone();
    let models_indexed = match blocking(move || catalog.count()).await {
        Ok(count) => Some(count),
        Err(ApiError(e)) => {
            warn!("Health check could not count catalog models: {}", e);
            None
        }
    };
    let bound = state
        .seats
        .status_all()
        .iter()
        .filter(|s| s.model_id.is_some())
        .count();
    Json(json!({
        "status": "ok",
        "service": "vertex",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_seconds": (Utc::now() - state.started_at).num_seconds(),
        "models_indexed": models_indexed,
        "seats": state.seats.seat_count(),
        "seats_bound": bound,
        "pools": state.pool_stats(),
    }))
}

/// GET /api/activity: idle clock and lifecycle state. Does not reset the clock.
async fn activity(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({ "status": "ok", "lifecycle": state.lifecycle.status() }))
}

/// POST /api/activity/touch: lets external daemons keep the process alive.
async fn touch(State(state): State<Arc<AppState>>) -> Json<Value> {
    state.clock.touch();
    Json(json!({ "status": "ok", "idle_seconds": state.clock.idle_seconds() }))
}
