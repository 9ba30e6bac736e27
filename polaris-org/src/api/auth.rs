//! API-key middleware for the user endpoints

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::state::AppState;

const API_KEY_HEADER: &str = "X-Api-Key";

/// Reject requests without the configured API key. An empty configured
/// key disables the check (development and tests).
pub async fn api_key_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    if state.api_key.is_empty() {
        return next.run(request).await;
    }

    let provided = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok());

    if provided != Some(state.api_key.as_str()) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "invalid api key" })),
        )
            .into_response();
    }

    next.run(request).await
}
