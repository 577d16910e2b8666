//! GitFS Server - HTTP file server over the GitFS remote cache.
//!
//! Routes:
//!
//! - `GET /health`: liveness plus per-remote health
//! - `GET /envs`: environments the remotes can serve
//! - `GET /files/{env}/{*path}`: raw file bytes
//! - `POST /refresh`: fetch every remote now
//! - `GET /metrics`: Prometheus text format

pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod server;
pub mod settings;
pub mod state;

pub use error::AppError;
pub use handlers::health::HealthResponse;
pub use server::{create_router, run_server};
pub use settings::{Settings, SettingsError};
pub use state::AppState;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
