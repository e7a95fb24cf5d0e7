//! Caller-facing errors. Every body carries an explicit `status` field.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use vertex_core::Error;

pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

pub fn status_for(error: &Error) -> StatusCode {
    match error {
        Error::Config(_) | Error::InvalidRequest(_) | Error::Range { .. } => {
            StatusCode::BAD_REQUEST
        }
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::NoCandidate(_) => StatusCode::UNPROCESSABLE_ENTITY,
        Error::DegradedDecision(_) | Error::StaleHandle(_) => StatusCode::CONFLICT,
        Error::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        Error::Http(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            tracing::error!("{}", self.0);
        }
        let body = Json(serde_json::json!({
            "status": "error",
            "error": self.0.kind(),
            "message": self.0.to_string(),
        }));
        (status, body).into_response()
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;
