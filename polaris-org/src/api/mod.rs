//! HTTP API for the orchestrator
//!
//! The CRM webhook authenticates itself with the shared secret; the user
//! endpoints sit behind the API-key middleware; SCIM authenticates per
//! tenant via api tokens. Health stays public.

pub mod auth;
pub mod salesforce;
pub mod scim;
pub mod users;

use axum::routing::{get, post};
use axum::{middleware, Json, Router};
use serde_json::json;

use crate::state::AppState;

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    // API-key protected user endpoints
    let protected = Router::new()
        .route("/user/user_idp", get(users::user_idp))
        .route("/user/get_user_status", get(users::get_user_status))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::api_key_middleware,
        ));

    // SCIM carries its own bearer auth per request
    let scim = Router::new()
        .route("/scim/v2/Users", post(scim::create_user))
        .route(
            "/scim/v2/Users/:id",
            get(scim::get_user)
                .put(scim::replace_user)
                .patch(scim::patch_user),
        );

    // Webhook validates the shared secret in its handler
    let public = Router::new()
        .route("/organization/salesforce", post(salesforce::webhook))
        .route("/health", get(health));

    Router::new()
        .merge(protected)
        .merge(scim)
        .merge(public)
        .with_state(state)
}

/// GET /health
async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "module": "polaris-org",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
