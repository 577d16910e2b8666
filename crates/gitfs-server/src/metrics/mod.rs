//! Prometheus metrics for the GitFS server.

pub mod cache;
pub mod http;
pub mod setup;

pub use cache::{ResolveOutcome, record_refresh, record_resolve, update_remote_gauges};
pub use setup::{init_metrics, register_metrics};
