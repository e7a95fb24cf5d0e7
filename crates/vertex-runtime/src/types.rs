//! Request and response types for the seat router.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
pub struct AssignRequest {
    pub seat_id: i64,
    pub task_description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentAlternative {
    pub model_id: String,
    pub similarity: f32,
    pub params_millions: u64,
}

/// Result of binding a seat to the winning model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignment {
    pub seat_name: String,
    pub seat_id: usize,
    pub model_id: String,
    pub description: String,
    /// Cosine similarity clamped to [0, 1].
    pub similarity: f32,
    pub cost_per_1k_tokens: f64,
    pub params_millions: u64,
    pub is_local: bool,
    pub alternatives: Vec<AssignmentAlternative>,
    pub endpoint: String,
    pub decision_id: String,
    /// Generation of the pooled binding. Unchanged across idempotent reassigns.
    pub handle_id: u64,
    pub reused: bool,
}

/// Caller-facing assignment outcome. Expected failures are `Rejected`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum AssignResponse {
    #[serde(rename = "ok")]
    Assigned(Assignment),
    Rejected { error: String, message: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct SeatStatus {
    pub seat_id: usize,
    pub seat_name: String,
    pub model_id: Option<String>,
    pub endpoint: Option<String>,
    pub bound_at: Option<DateTime<Utc>>,
    /// The bound handle has not collapsed.
    pub live: bool,
    pub handle_id: Option<u64>,
}
