//! Error types for the HTTP API.
//!
//! [`ApiError`] converts into an Axum response with a JSON body of the
//! form `{"error": ..., "status": ...}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use stressfeed_sources::SourceError;

/// Errors that can occur in the HTTP layer.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The request body was not usable.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Persisting a webhook document failed.
    #[error("storage error: {0}")]
    Storage(#[from] SourceError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            Self::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                serde_json::json!({
                    "error": msg,
                    "status": StatusCode::BAD_REQUEST.as_u16(),
                }),
            ),
            Self::Storage(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                serde_json::json!({
                    "error": "Failed to process webhook",
                    "details": e.to_string(),
                    "status": StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
                }),
            ),
        };
        (status, axum::Json(body)).into_response()
    }
}
