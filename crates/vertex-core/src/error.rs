//! Error types for Vertex.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Unknown provider or key, or missing auth material.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Model id unresolvable even via registry fetch.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Request body, path or query that could not be decoded.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Seat index {seat_id} out of range (0..{seats})")]
    Range { seat_id: i64, seats: usize },

    #[error("No candidate: {0}")]
    NoCandidate(String),

    /// The zero-cost objective was violated. Warning-level, never fatal.
    #[error("Degraded decision: {0}")]
    DegradedDecision(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    /// Use of a handle after it collapsed.
    #[error("Stale handle: {0}")]
    StaleHandle(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Inference error: {0}")]
    Inference(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Stable label used in caller-facing responses.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Config(_) => "config_error",
            Error::NotFound(_) => "not_found",
            Error::InvalidRequest(_) => "invalid_request",
            Error::Range { .. } => "range_error",
            Error::NoCandidate(_) => "no_candidate",
            Error::DegradedDecision(_) => "degraded_decision",
            Error::Timeout(_) => "timeout",
            Error::StaleHandle(_) => "stale_handle",
            Error::Storage(_) => "storage_error",
            Error::Database(_) => "database_error",
            Error::Inference(_) => "inference_error",
            Error::Http(_) => "http_error",
            Error::Io(_) => "io_error",
            Error::Json(_) => "json_error",
            Error::Internal(_) => "internal_error",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_labels() {
        assert_eq!(Error::Range { seat_id: 7, seats: 5 }.kind(), "range_error");
        assert_eq!(Error::NoCandidate("empty".into()).kind(), "no_candidate");
        assert_eq!(Error::Config("x".into()).kind(), "config_error");
        assert_eq!(Error::InvalidRequest("x".into()).kind(), "invalid_request");
    }

    #[test]
    fn test_range_message() {
        let err = Error::Range { seat_id: -1, seats: 5 };
        assert_eq!(err.to_string(), "Seat index -1 out of range (0..5)");
    }
}
