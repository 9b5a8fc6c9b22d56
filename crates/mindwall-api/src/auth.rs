//! API key authentication
//!
//! Internal callers (the proxy and the browser extension relay) share one
//! secret and send it in the X-MindWall-Key header. `/health` and the
//! websocket upgrade stay public.

use crate::error::ApiError;
use crate::AppState;
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;

/// Header carrying the shared secret.
pub const API_KEY_HEADER: &str = "x-mindwall-key";

/// Middleware validating the shared-secret header on protected routes.
pub async fn require_api_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let provided = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok());

    match provided {
        None => {
            tracing::warn!(path = %request.uri().path(), "auth.missing_key");
            Err(ApiError::MissingKey)
        }
        Some(key) if key != state.settings.api_secret_key => {
            tracing::warn!(path = %request.uri().path(), "auth.invalid_key");
            Err(ApiError::InvalidKey)
        }
        Some(_) => Ok(next.run(request).await),
    }
}
