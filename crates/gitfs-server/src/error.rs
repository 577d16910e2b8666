//! HTTP error responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use gitfs_git::RemoteFailure;
use serde::Serialize;

/// Errors returned by handlers.
#[derive(Debug)]
pub enum AppError {
    /// No remote has the file.
    NotFound { env: String, path: String },

    /// No remote has the file and at least one remote could not be asked.
    Unavailable {
        env: String,
        path: String,
        failures: Vec<RemoteFailure>,
    },

    /// Malformed request.
    BadRequest(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    failures: Vec<RemoteFailure>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, message, failures) = match self {
            AppError::NotFound { env, path } => (
                StatusCode::NOT_FOUND,
                "Not Found",
                format!("{} not found in environment '{}'", path, env),
                Vec::new(),
            ),
            AppError::Unavailable {
                env,
                path,
                failures,
            } => (
                StatusCode::SERVICE_UNAVAILABLE,
                "Service Unavailable",
                format!(
                    "{} not found in environment '{}' and {} remote(s) failed",
                    path,
                    env,
                    failures.len()
                ),
                failures,
            ),
            AppError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, "Bad Request", message, Vec::new())
            },
        };

        let body = Json(ErrorResponse {
            error,
            message,
            failures,
        });

        (status, body).into_response()
    }
}
