//! Provider routes: connection document management and chat completions.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use vertex_core::Error;
use vertex_providers::{ChatMessage, ProviderConfig};

use crate::error::{ApiError, ApiResult};
use crate::extract::{ApiJson, ApiPath};
use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/providers", get(list_providers).post(register_provider))
        .route("/providers/reload", post(reload_providers))
        .route("/providers/{name}", delete(remove_provider))
        .route("/chat/completions", post(chat_completion))
}

async fn list_providers(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "providers": state.providers.list(),
        "pool": state.providers.stats(),
    }))
}

#[derive(Deserialize)]
struct RegisterRequest {
    name: String,
    #[serde(flatten)]
    config: ProviderConfig,
}

/// POST /api/providers: register a provider and persist the document.
async fn register_provider(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> ApiResult<Json<Value>> {
    let name = req.name.trim();
    if name.is_empty() {
        return Err(ApiError(Error::InvalidRequest("provider name is required".into())));
    }
    state.providers.register(name, req.config)?;
    Ok(Json(json!({ "status": "ok", "name": name })))
}

async fn reload_providers(State(state): State<Arc<AppState>>) -> ApiResult<Json<Value>> {
    let changed = state.providers.reload()?;
    Ok(Json(json!({ "status": "ok", "changed": changed })))
}

async fn remove_provider(
    State(state): State<Arc<AppState>>,
    ApiPath(name): ApiPath<String>,
) -> ApiResult<Json<Value>> {
    if !state.providers.remove(&name)? {
        return Err(ApiError(Error::NotFound(format!("provider {}", name))));
    }
    Ok(Json(json!({ "status": "ok", "name": name })))
}

#[derive(Deserialize)]
struct CompletionRequest {
    provider: String,
    model: String,
    messages: Vec<ChatMessage>,
}

/// POST /api/chat/completions: route a conversation through a pooled provider client.
async fn chat_completion(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<CompletionRequest>,
) -> ApiResult<Json<Value>> {
    let content = state
        .providers
        .complete(&req.provider, &req.model, &req.messages)
        .await?;
    Ok(Json(json!({
        "status": "ok",
        "provider": req.provider,
        "model": req.model,
        "content": content,
    })))
}
