//! Metrics endpoint handler.

use axum::{extract::State, response::IntoResponse};
use metrics_exporter_prometheus::PrometheusHandle;

use crate::metrics::update_remote_gauges;
use crate::state::AppState;

/// State of the metrics route.
#[derive(Clone)]
pub struct MetricsState {
    pub prometheus: PrometheusHandle,
    pub app: AppState,
}

/// GET /metrics
/// Refreshes the per-remote gauges, then renders the Prometheus text format.
pub async fn metrics_handler(State(state): State<MetricsState>) -> impl IntoResponse {
    update_remote_gauges(&state.app.source().health().await);
    state.prometheus.render()
}
