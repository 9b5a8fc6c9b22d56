//! API error responses

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use mindwall_analysis::{FieldError, RepoError};
use serde_json::json;

/// Errors surfaced at the REST boundary.
#[derive(Debug)]
pub enum ApiError {
    /// Missing X-MindWall-Key header
    MissingKey,
    /// X-MindWall-Key header did not match
    InvalidKey,
    /// Request failed field validation
    Validation(Vec<FieldError>),
    /// Persistence or other internal failure
    Internal(String),
}

impl From<RepoError> for ApiError {
    fn from(e: RepoError) -> Self {
        ApiError::Internal(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::MissingKey => (
                StatusCode::UNAUTHORIZED,
                Json(json!({"detail": "Missing X-MindWall-Key header"})),
            )
                .into_response(),
            ApiError::InvalidKey => (
                StatusCode::FORBIDDEN,
                Json(json!({"detail": "Invalid API key"})),
            )
                .into_response(),
            ApiError::Validation(errors) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({"detail": "Validation failed", "errors": errors})),
            )
                .into_response(),
            ApiError::Internal(detail) => {
                tracing::error!(detail, "api.internal_error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({"detail": format!("Analysis failed: {}", detail)})),
                )
                    .into_response()
            }
        }
    }
}
