//! Periodic refresh of a registry's caches.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

use crate::registry::{CacheRegistry, RefreshReport};

/// Cadence and backoff of background refreshes.
#[derive(Debug, Clone, PartialEq)]
pub struct RefreshConfig {
    /// Time between scheduler ticks, and the cooldown of a healthy cache.
    pub interval: Duration,
    /// Consecutive failures tolerated before the cooldown starts growing.
    pub max_failures: u32,
    /// Growth factor of the cooldown per further failure.
    pub backoff_multiplier: f64,
    /// Upper bound of the cooldown.
    pub max_backoff: Duration,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            max_failures: 3,
            backoff_multiplier: 2.0,
            max_backoff: Duration::from_secs(600),
        }
    }
}

/// Keeps a started scheduler alive; stops it when dropped.
pub struct RefreshHandle {
    shutdown_tx: watch::Sender<bool>,
}

impl RefreshHandle {
    /// Stops the scheduler after its current pass.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

impl Drop for RefreshHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Callback invoked with the report of every refresh pass.
pub type ReportObserver = Arc<dyn Fn(&RefreshReport) + Send + Sync>;

/// Periodically refreshes every cache in a registry.
///
/// Each tick refreshes the caches whose cooldown has elapsed, so a remote
/// that keeps failing backs off without delaying the others.
pub struct RefreshScheduler {
    registry: Arc<CacheRegistry>,
    config: RefreshConfig,
    observer: Option<ReportObserver>,
}

impl RefreshScheduler {
    /// Creates a scheduler over `registry`.
    pub fn new(registry: Arc<CacheRegistry>, config: RefreshConfig) -> Self {
        Self {
            registry,
            config,
            observer: None,
        }
    }

    /// Creates a scheduler with [`RefreshConfig::default`].
    pub fn with_defaults(registry: Arc<CacheRegistry>) -> Self {
        Self::new(registry, RefreshConfig::default())
    }

    /// Sets a callback that sees every refresh report.
    pub fn with_observer(mut self, observer: ReportObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Returns the configuration.
    pub fn config(&self) -> &RefreshConfig {
        &self.config
    }

    /// Spawns the refresh loop on the current runtime.
    pub fn start(self) -> RefreshHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = RefreshHandle { shutdown_tx };

        tokio::spawn(self.run(shutdown_rx));

        handle
    }

    async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        let mut interval_timer = interval(self.config.interval);
        interval_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            "Refreshing caches every {:?}",
            self.config.interval
        );

        loop {
            tokio::select! {
                _ = interval_timer.tick() => {
                    self.do_refresh().await;
                }
                result = shutdown_rx.changed() => {
                    if result.is_err() || *shutdown_rx.borrow() {
                        info!("Stopping refresh scheduler");
                        break;
                    }
                }
            }
        }
    }

    async fn do_refresh(&self) {
        debug!("Scheduled refresh pass");

        let report = self.registry.refresh_due(&self.config).await;
        for failure in &report.failures {
            warn!("Refresh of {} failed: {}", failure.remote, failure.error);
        }
        debug!(
            "Scheduled refresh done: {} refreshed, {} failed",
            report.refreshed.len(),
            report.failures.len()
        );
        self.observe(&report);
    }

    fn observe(&self, report: &RefreshReport) {
        if let Some(observer) = &self.observer {
            observer(report);
        }
    }

    /// Manually refreshes every cache, ignoring cooldowns.
    pub async fn trigger_refresh(&self) -> RefreshReport {
        info!("Refreshing every cache on request");
        let report = self.registry.refresh_all().await;
        self.observe(&report);
        report
    }
}
