//! HTTP error mapping.
//!
//! The surface never leaks internals: validation failures map to `400` with
//! the issue list, everything else to `500` with a short message.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

#[derive(Debug)]
pub enum ApiError {
    /// Payload failed the market-order schema check.
    Validation(Vec<String>),
    /// Anything unexpected.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Validation(issues) => (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({
                    "message": "Invalid payload",
                    "issues": issues,
                })),
            )
                .into_response(),
            ApiError::Internal(message) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "message": message })),
            )
                .into_response(),
        }
    }
}
