//! Background synchronization and refresh scheduling.
//!
//! This module provides the per-cache fetch state and the scheduler that
//! refreshes a registry's caches on a configurable cadence.

mod scheduler;
mod state;

pub use scheduler::{RefreshConfig, RefreshHandle, RefreshScheduler, ReportObserver};
pub use state::CacheState;
