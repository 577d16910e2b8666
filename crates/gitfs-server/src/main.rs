//! GitFS server binary.

use std::sync::Arc;

use gitfs_git::{CacheRegistry, RefreshScheduler};
use gitfs_server::metrics::{init_metrics, record_refresh};
use gitfs_server::{AppState, Settings, run_server};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = Settings::load()?;
    let addr = settings.addr()?;
    let refresh = settings.refresh_config()?;

    tracing::info!("Starting GitFS server v{}", gitfs_server::version());
    if settings.remotes.is_empty() {
        tracing::warn!("No remotes configured; every file request will miss");
    }

    let prometheus = init_metrics()?;

    let registry = Arc::new(CacheRegistry::new());
    let report = registry.load(settings.remotes.clone()).await?;
    for disabled in &report.disabled {
        tracing::warn!("Remote {} disabled: {}", disabled.remote, disabled.reason);
    }

    tracing::info!("Refreshing remotes every {:?}", refresh.interval);
    let _scheduler = RefreshScheduler::new(Arc::clone(&registry), refresh)
        .with_observer(Arc::new(record_refresh))
        .start();

    let state = AppState::from_registry(registry);
    run_server(addr, state, prometheus).await?;

    Ok(())
}
