use axum::{Json, extract::State};
use gitfs_git::CacheHealth;
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub remotes: Vec<CacheHealth>,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "UP".to_string(),
            remotes: Vec::new(),
        }
    }
}

/// GET /health
///
/// Liveness stays `UP` while the process serves requests; per-remote state
/// is listed alongside.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        remotes: state.source().health().await,
        ..HealthResponse::default()
    })
}
