//! Catalog routes: semantic search, fetch-on-miss lookup, bulk indexing.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use vertex_store::SearchFilters;

use super::blocking;
use crate::error::ApiResult;
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/catalog/search", get(search))
        .route("/catalog/models", post(index_model).get(list_models))
        .route("/catalog/models/{*id}", get(get_model))
        .route("/catalog/stats", get(get_stats))
        .route("/catalog/bulk-index", post(bulk_index))
}

#[derive(Deserialize)]
struct SearchQuery {
    query: String,
    #[serde(default = "default_limit")]
    limit: usize,
    #[serde(default)]
    max_cost: f64,
    #[serde(default)]
    capability: Option<String>,
    #[serde(default)]
    max_params: Option<u64>,
}

fn default_limit() -> usize {
    10
}

/// GET /api/catalog/search: filtered cosine ranking.
async fn search(
    State(state): State<Arc<AppState>>,
    ApiQuery(q): ApiQuery<SearchQuery>,
) -> ApiResult<Json<Value>> {
    let mut filters = SearchFilters::default().with_max_cost(q.max_cost.max(0.0));
    if let Some(tag) = q.capability {
        filters = filters.with_capability(tag);
    }
    if let Some(max_params) = q.max_params {
        filters = filters.with_max_params(max_params);
    }

    let catalog = state.catalog.clone();
    let query = q.query.clone();
    let limit = q.limit.clamp(1, 100);
    let results = blocking(move || catalog.search(&query, &filters, limit)).await?;

    Ok(Json(json!({
        "status": "ok",
        "query": q.query,
        "total": results.len(),
        "results": results,
    })))
}

#[derive(Deserialize)]
struct IndexRequest {
    model_id: String,
}

/// POST /api/catalog/models: fetch, embed and store one registry model.
async fn index_model(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<IndexRequest>,
) -> ApiResult<Json<Value>> {
    let added = state.catalog.index_model(&req.model_id).await?;
    let model = state.catalog.get_or_fetch(&req.model_id).await?;
    Ok(Json(json!({ "status": "ok", "added": added, "model": model })))
}

#[derive(Deserialize)]
struct ListQuery {
    #[serde(default = "default_list_limit")]
    limit: usize,
}

fn default_list_limit() -> usize {
    50
}

async fn list_models(
    State(state): State<Arc<AppState>>,
    ApiQuery(q): ApiQuery<ListQuery>,
) -> ApiResult<Json<Value>> {
    let catalog = state.catalog.clone();
    let (models, total) =
        blocking(move || Ok((catalog.list(q.limit)?, catalog.count()?))).await?;
    Ok(Json(json!({
        "status": "ok",
        "total": total,
        "models": models,
    })))
}

/// GET /api/catalog/models/{*id}: local record, fetched from the registry on a miss.
async fn get_model(
    State(state): State<Arc<AppState>>,
    ApiPath(id): ApiPath<String>,
) -> ApiResult<Json<Value>> {
    let model = state.catalog.get_or_fetch(id.trim_start_matches('/')).await?;
    Ok(Json(json!({ "status": "ok", "model": model })))
}

async fn get_stats(State(state): State<Arc<AppState>>) -> ApiResult<Json<Value>> {
    let catalog = state.catalog.clone();
    let stats = blocking(move || catalog.stats()).await?;
    Ok(Json(json!({
        "status": "ok",
        "catalog": stats,
        "embedder": state.catalog.embedder_stats(),
    })))
}

#[derive(Deserialize, Default)]
struct BulkIndexRequest {
    #[serde(default)]
    limit: Option<usize>,
}

/// POST /api/catalog/bulk-index: index the registry's most popular models.
async fn bulk_index(
    State(state): State<Arc<AppState>>,
    body: Option<ApiJson<BulkIndexRequest>>,
) -> ApiResult<Json<Value>> {
    let req = body.map(|ApiJson(b)| b).unwrap_or_default();
    let limit = req.limit.unwrap_or(state.config.bulk_index_limit);
    let report = state.catalog.bulk_index_popular(limit).await?;
    Ok(Json(json!({ "status": "ok", "report": report })))
}
