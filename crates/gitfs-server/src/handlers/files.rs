//! File endpoint.

use std::time::Instant;

use axum::{
    extract::{Path, State},
    http::{HeaderName, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::error::AppError;
use crate::metrics::{ResolveOutcome, record_resolve};
use crate::state::AppState;

/// Remote that served the file.
pub static REMOTE_HEADER: HeaderName = HeaderName::from_static("x-gitfs-remote");
/// Ref the file was read from.
pub static REF_HEADER: HeaderName = HeaderName::from_static("x-gitfs-ref");
/// Commit the file was read at.
pub static COMMIT_HEADER: HeaderName = HeaderName::from_static("x-gitfs-commit");
/// Set when the environment matched several diverged refs.
pub static AMBIGUITY_HEADER: HeaderName = HeaderName::from_static("x-gitfs-ambiguity");

#[derive(Debug, Deserialize)]
pub struct FilePath {
    pub env: String,
    pub path: String,
}

/// GET /files/{env}/{*path}
/// Serves the raw bytes of `path` from the first remote that has it.
#[instrument(skip_all, fields(env = %params.env, path = %params.path))]
pub async fn get_file(
    State(state): State<AppState>,
    Path(params): Path<FilePath>,
) -> Result<Response, AppError> {
    if params.path.trim_matches('/').is_empty() {
        return Err(AppError::BadRequest("file path must not be empty".to_string()));
    }

    let start = Instant::now();
    let resolution = state.source().resolve(&params.env, &params.path).await;
    record_resolve(ResolveOutcome::of(&resolution), start.elapsed());

    let Some(file) = resolution.file else {
        return Err(if resolution.failures.is_empty() {
            AppError::NotFound {
                env: params.env,
                path: params.path,
            }
        } else {
            AppError::Unavailable {
                env: params.env,
                path: params.path,
                failures: resolution.failures,
            }
        });
    };

    debug!(remote = %file.remote, reference = %file.ref_name, "Serving file");

    let mut response = (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/octet-stream")],
        file.content,
    )
        .into_response();

    let headers = response.headers_mut();
    let values = [
        (&REMOTE_HEADER, Some(file.remote)),
        (&REF_HEADER, Some(file.ref_name)),
        (&COMMIT_HEADER, Some(file.commit)),
        (&AMBIGUITY_HEADER, file.ambiguity),
    ];
    for (name, value) in values {
        if let Some(value) = value.and_then(|v| HeaderValue::from_str(&v).ok()) {
            headers.insert(name.clone(), value);
        }
    }

    Ok(response)
}
