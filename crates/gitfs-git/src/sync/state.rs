//! Per-cache refresh state tracking.

use std::time::{Duration, Instant};

use parking_lot::RwLock;

use super::RefreshConfig;

#[derive(Debug, Default)]
struct Inner {
    last_fetch: Option<Instant>,
    last_attempt: Option<Instant>,
    last_error: Option<String>,
    failure_count: u32,
}

/// Tracks the fetch history of one cache for scheduling and health reporting.
#[derive(Debug, Default)]
pub struct CacheState {
    inner: RwLock<Inner>,
}

impl CacheState {
    /// Creates a new CacheState.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the time of the last successful fetch.
    pub fn last_fetch(&self) -> Option<Instant> {
        self.inner.read().last_fetch
    }

    /// Returns the duration since the last successful fetch.
    pub fn time_since_fetch(&self) -> Option<Duration> {
        self.inner.read().last_fetch.map(|t| t.elapsed())
    }

    /// Records a successful clone or fetch.
    pub fn record_success(&self) {
        let mut inner = self.inner.write();
        let now = Instant::now();
        inner.last_fetch = Some(now);
        inner.last_attempt = Some(now);
        inner.last_error = None;
        inner.failure_count = 0;
    }

    /// Records a failed clone or fetch.
    pub fn record_failure(&self, error: impl Into<String>) {
        let mut inner = self.inner.write();
        inner.last_attempt = Some(Instant::now());
        inner.last_error = Some(error.into());
        inner.failure_count += 1;
    }

    /// Returns the last error message.
    pub fn last_error(&self) -> Option<String> {
        self.inner.read().last_error.clone()
    }

    /// Returns the number of consecutive failures.
    pub fn failure_count(&self) -> u32 {
        self.inner.read().failure_count
    }

    /// Returns true if the last attempt succeeded.
    pub fn is_healthy(&self) -> bool {
        let inner = self.inner.read();
        inner.last_fetch.is_some() && inner.last_error.is_none()
    }

    /// Returns the delay before the next attempt.
    ///
    /// The base interval applies until `max_failures` consecutive failures;
    /// each failure from then on multiplies it by `backoff_multiplier`, up to
    /// `max_backoff`.
    pub fn cooldown(&self, config: &RefreshConfig) -> Duration {
        let failures = self.failure_count();
        if failures < config.max_failures {
            return config.interval;
        }

        let exponent = (failures - config.max_failures + 1).min(32) as i32;
        let secs = config.interval.as_secs_f64() * config.backoff_multiplier.powi(exponent);
        Duration::from_secs_f64(secs.min(config.max_backoff.as_secs_f64()))
    }

    /// Returns true if the cooldown since the last attempt has elapsed.
    pub fn is_due(&self, config: &RefreshConfig) -> bool {
        let last_attempt = self.inner.read().last_attempt;
        match last_attempt {
            Some(at) => at.elapsed() >= self.cooldown(config),
            None => true,
        }
    }
}
