//! HTTP route handlers.

pub mod catalog;
pub mod decisions;
pub mod health;
pub mod providers;
pub mod seats;

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::Method;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use vertex_core::Error;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Read-only status checks that must not count as activity.
const PASSIVE_PATHS: &[&str] = &["/api/health", "/api/activity"];

/// Build the main Axum router with all routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .nest("/api", api_routes())
        .layer(middleware::from_fn_with_state(state.clone(), touch_activity))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .merge(seats::routes())
        .merge(catalog::routes())
        .merge(decisions::routes())
        .merge(providers::routes())
        .merge(health::routes())
}

async fn touch_activity(State(state): State<Arc<AppState>>, req: Request, next: Next) -> Response {
    let passive = *req.method() == Method::GET && PASSIVE_PATHS.contains(&req.uri().path());
    if !passive {
        state.clock.touch();
    }
    next.run(req).await
}

/// Run synchronous catalog or pool work off the async executor.
pub(crate) async fn blocking<T, F>(f: F) -> ApiResult<T>
where
    F: FnOnce() -> vertex_core::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError(Error::Internal(e.to_string())))?
        .map_err(ApiError::from)
}
