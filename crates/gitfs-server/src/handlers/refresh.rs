//! Manual refresh endpoint.

use axum::{Json, extract::State};
use gitfs_git::RefreshReport;
use tracing::{info, instrument, warn};

use crate::metrics::record_refresh;
use crate::state::AppState;

/// POST /refresh
/// Fetches every remote now and reports the per-remote outcome.
#[instrument(skip_all)]
pub async fn refresh_all(State(state): State<AppState>) -> Json<RefreshReport> {
    let report = state.source().refresh().await;
    record_refresh(&report);

    for failure in &report.failures {
        warn!(remote = %failure.remote, error = %failure.error, "Refresh failed");
    }
    info!(
        refreshed = report.refreshed.len(),
        failed = report.failures.len(),
        "Manual refresh done"
    );

    Json(report)
}
