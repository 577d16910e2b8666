//! Environment listing.

use axum::{Json, extract::State};

use crate::state::AppState;

/// GET /envs
/// Lists every environment the configured remotes can serve.
pub async fn list_envs(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.source().envs().await)
}
