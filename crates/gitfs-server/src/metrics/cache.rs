//! Resolution and refresh metrics.

use std::time::Duration;

use gitfs_git::{CacheHealth, RefreshReport, Resolution};
use metrics::{counter, gauge, histogram};

/// How a file request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveOutcome {
    Hit,
    Miss,
    Degraded,
}

impl ResolveOutcome {
    /// Classifies a resolution.
    pub fn of(resolution: &Resolution) -> Self {
        if resolution.file.is_some() {
            Self::Hit
        } else if resolution.is_degraded() {
            Self::Degraded
        } else {
            Self::Miss
        }
    }

    /// Returns the label value.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hit => "hit",
            Self::Miss => "miss",
            Self::Degraded => "degraded",
        }
    }
}

/// Describes the cache metrics.
pub fn register_cache_metrics() {
    metrics::describe_counter!("gitfs_resolve_total", "File resolutions by outcome");
    metrics::describe_histogram!("gitfs_resolve_seconds", "Time spent resolving a file");
    metrics::describe_counter!("gitfs_refresh_total", "Remote refreshes by outcome");
    metrics::describe_gauge!("gitfs_remote_ready", "1 if the remote has a snapshot");
    metrics::describe_gauge!("gitfs_remote_refs", "Refs in the remote's current snapshot");
    metrics::describe_gauge!(
        "gitfs_remote_failures",
        "Consecutive failed fetches of the remote"
    );
}

/// Records one resolution.
pub fn record_resolve(outcome: ResolveOutcome, duration: Duration) {
    counter!("gitfs_resolve_total", "outcome" => outcome.as_str()).increment(1);
    histogram!("gitfs_resolve_seconds", "outcome" => outcome.as_str())
        .record(duration.as_secs_f64());
}

/// Records the per-remote outcomes of a refresh pass.
pub fn record_refresh(report: &RefreshReport) {
    for remote in &report.refreshed {
        let outcome = if remote.changed { "changed" } else { "unchanged" };
        counter!("gitfs_refresh_total", "outcome" => outcome).increment(1);
    }
    for failure in &report.failures {
        let outcome = if failure.transient { "failed" } else { "error" };
        counter!("gitfs_refresh_total", "outcome" => outcome).increment(1);
    }
}

/// Publishes per-remote health as gauges.
pub fn update_remote_gauges(health: &[CacheHealth]) {
    for remote in health {
        let ready = if remote.ready { 1.0 } else { 0.0 };
        gauge!("gitfs_remote_ready", "remote" => remote.remote.clone()).set(ready);
        gauge!("gitfs_remote_refs", "remote" => remote.remote.clone()).set(remote.refs as f64);
        gauge!("gitfs_remote_failures", "remote" => remote.remote.clone())
            .set(f64::from(remote.failure_count));
    }
}
