//! Registry of remote caches.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use gitfs_core::{Provider, RemoteConfig, RemoteId};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::cache::{CacheHealth, Mirror, RemoteCache};
use crate::error::GitFsError;
use crate::provider::{self, FetchResult, ProviderBinding};
use crate::sync::RefreshConfig;

/// Chooses the binding a cache uses for its provider.
pub type BindingSelector = Arc<dyn Fn(Provider) -> Arc<dyn ProviderBinding> + Send + Sync>;

/// A remote that failed an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteFailure {
    pub remote: String,
    pub error: String,
    pub transient: bool,
}

impl RemoteFailure {
    /// Records `error` against `remote`.
    pub fn new(remote: &RemoteId, error: &GitFsError) -> Self {
        Self {
            remote: remote.to_string(),
            error: error.to_string(),
            transient: error.is_transient(),
        }
    }
}

/// A remote disabled by the last load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisabledRemote {
    pub remote: RemoteId,
    pub reason: String,
}

/// Outcome of [`CacheRegistry::load`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    pub added: Vec<RemoteId>,
    pub reused: Vec<RemoteId>,
    pub removed: Vec<RemoteId>,
    pub disabled: Vec<DisabledRemote>,
}

/// A remote refreshed successfully.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshedRemote {
    pub remote: String,
    pub changed: bool,
    pub new_refs: BTreeSet<String>,
}

/// Outcome of refreshing several caches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RefreshReport {
    pub refreshed: Vec<RefreshedRemote>,
    pub failures: Vec<RemoteFailure>,
}

impl RefreshReport {
    /// Returns true if no cache failed.
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Default)]
struct Inner {
    caches: HashMap<RemoteId, Arc<RemoteCache>>,
    order: Vec<RemoteId>,
    disabled: HashMap<RemoteId, String>,
    /// Removed mirrors whose snapshot is still held by readers.
    retired: HashMap<RemoteId, Arc<Mirror>>,
}

/// Owns every remote cache, keyed by (url, cache root).
///
/// Configuration order is precedence order. The map only changes in
/// [`load`](Self::load), which is serialized; readers take a cheap snapshot
/// of the active caches and hold the `Arc`s for the duration of a lookup.
pub struct CacheRegistry {
    selector: BindingSelector,
    inner: RwLock<Inner>,
    load_lock: Mutex<()>,
}

impl CacheRegistry {
    /// Creates an empty registry using the process-wide bindings.
    pub fn new() -> Self {
        Self::with_selector(Arc::new(provider::binding_for))
    }

    /// Creates an empty registry with a custom binding selector.
    pub fn with_selector(selector: BindingSelector) -> Self {
        Self {
            selector,
            inner: RwLock::new(Inner::default()),
            load_lock: Mutex::new(()),
        }
    }

    /// Applies a new set of remote configurations.
    ///
    /// Duplicate identities collapse to the first entry. Caches whose
    /// identity disappeared are removed and their mirrors retired. Caches
    /// without a snapshot are cloned concurrently; a remote that is not a
    /// usable repository is disabled until the next load.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if any configuration is invalid; nothing changes then.
    pub async fn load(&self, configs: Vec<RemoteConfig>) -> Result<LoadReport, GitFsError> {
        let _guard = self.load_lock.lock().await;

        for config in &configs {
            config.validate()?;
        }

        let mut unique: Vec<RemoteConfig> = Vec::with_capacity(configs.len());
        let mut positions: HashMap<RemoteId, usize> = HashMap::new();
        for config in configs {
            let id = config.id();
            match positions.get(&id) {
                Some(&first) if unique[first] != config => {
                    warn!("Remote {} is configured twice with different settings, keeping the first", id);
                },
                Some(_) => debug!("Remote {} is configured twice", id),
                None => {
                    positions.insert(id, unique.len());
                    unique.push(config);
                },
            }
        }

        let (existing, mut retired) = {
            let inner = self.inner.read();
            (inner.caches.clone(), inner.retired.clone())
        };
        retired.retain(|_, mirror| mirror.is_draining());
        let mut report = LoadReport::default();
        let mut caches = HashMap::with_capacity(unique.len());
        let mut order = Vec::with_capacity(unique.len());

        for config in unique {
            let id = config.id();
            let cache = match existing.get(&id) {
                Some(current) if current.config() == &config => Arc::clone(current),
                Some(current) => {
                    debug!("Settings of {} changed, keeping its mirror", id);
                    let binding = (self.selector)(config.provider());
                    Arc::new(RemoteCache::with_mirror(
                        config,
                        binding,
                        Arc::clone(current.mirror()),
                    )?)
                },
                None => {
                    let binding = (self.selector)(config.provider());
                    match retired.remove(&id) {
                        Some(mirror) if mirror.revive() => {
                            debug!("Remote {} is back, reviving its retired mirror", id);
                            Arc::new(RemoteCache::with_mirror(config, binding, mirror)?)
                        },
                        _ => Arc::new(RemoteCache::new(config, binding)?),
                    }
                },
            };

            if existing.contains_key(&id) {
                report.reused.push(id.clone());
            } else {
                report.added.push(id.clone());
            }
            caches.insert(id.clone(), cache);
            order.push(id);
        }

        let removed: Vec<Arc<RemoteCache>> = existing
            .into_iter()
            .filter(|(id, _)| !caches.contains_key(id))
            .map(|(_, cache)| cache)
            .collect();

        {
            let mut inner = self.inner.write();
            inner.caches = caches;
            inner.order = order;
            inner.disabled.clear();
        }

        for cache in removed {
            info!("Removing remote {}", cache.id());
            cache.retire();
            report.removed.push(cache.id());
            if cache.mirror().is_draining() {
                retired.insert(cache.id(), Arc::clone(cache.mirror()));
            }
        }
        self.inner.write().retired = retired;

        let mut tasks = JoinSet::new();
        for cache in self.active_caches().into_iter().filter(|c| !c.is_ready()) {
            tasks.spawn(async move {
                let result = cache.ensure_cloned().await;
                (cache, result)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((cache, Ok(()))) => info!("Remote {} is ready", cache.id()),
                Ok((cache, Err(e))) if e.is_configuration_error() => {
                    warn!("Disabling remote {}: {}", cache.id(), e);
                    self.inner.write().disabled.insert(cache.id(), e.to_string());
                    report.disabled.push(DisabledRemote {
                        remote: cache.id(),
                        reason: e.to_string(),
                    });
                },
                Ok((cache, Err(e))) => warn!("Remote {} is not ready yet: {}", cache.id(), e),
                Err(e) => warn!("Clone task failed: {}", e),
            }
        }

        info!(
            "Loaded {} remote(s): {} added, {} reused, {} removed, {} disabled",
            self.len(),
            report.added.len(),
            report.reused.len(),
            report.removed.len(),
            report.disabled.len()
        );
        Ok(report)
    }

    /// Refreshes every active cache concurrently.
    ///
    /// Failures are collected in the report; one failing remote never stops
    /// the others.
    pub async fn refresh_all(&self) -> RefreshReport {
        Self::refresh_caches(self.active_caches()).await
    }

    /// Refreshes the active caches whose cooldown has elapsed.
    pub async fn refresh_due(&self, config: &RefreshConfig) -> RefreshReport {
        let due = self
            .active_caches()
            .into_iter()
            .filter(|cache| cache.is_due(config))
            .collect();
        Self::refresh_caches(due).await
    }

    async fn refresh_caches(caches: Vec<Arc<RemoteCache>>) -> RefreshReport {
        let mut tasks = JoinSet::new();
        for (index, cache) in caches.into_iter().enumerate() {
            tasks.spawn(async move {
                let result = cache.refresh().await;
                (index, cache.id(), result)
            });
        }

        let mut outcomes: Vec<(usize, RemoteId, Result<FetchResult, GitFsError>)> = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => warn!("Refresh task failed: {}", e),
            }
        }
        outcomes.sort_by_key(|(index, _, _)| *index);

        let mut report = RefreshReport::default();
        for (_, id, result) in outcomes {
            match result {
                Ok(fetch) => report.refreshed.push(RefreshedRemote {
                    remote: id.to_string(),
                    changed: fetch.changed,
                    new_refs: fetch.new_refs,
                }),
                Err(e) => report.failures.push(RemoteFailure::new(&id, &e)),
            }
        }
        report
    }

    /// Returns the active caches in precedence order.
    pub fn active_caches(&self) -> Vec<Arc<RemoteCache>> {
        let inner = self.inner.read();
        inner
            .order
            .iter()
            .filter(|id| !inner.disabled.contains_key(*id))
            .filter_map(|id| inner.caches.get(id).cloned())
            .collect()
    }

    /// Returns the cache for an identity, disabled or not.
    pub fn get(&self, id: &RemoteId) -> Option<Arc<RemoteCache>> {
        self.inner.read().caches.get(id).cloned()
    }

    /// Returns the disabled remotes and why.
    pub fn disabled(&self) -> Vec<DisabledRemote> {
        let inner = self.inner.read();
        inner
            .order
            .iter()
            .filter_map(|id| {
                inner.disabled.get(id).map(|reason| DisabledRemote {
                    remote: id.clone(),
                    reason: reason.clone(),
                })
            })
            .collect()
    }

    /// Returns the health of every active cache.
    pub fn health(&self) -> Vec<CacheHealth> {
        self.active_caches().iter().map(|c| c.health()).collect()
    }

    /// Returns the number of configured caches, disabled ones included.
    pub fn len(&self) -> usize {
        self.inner.read().caches.len()
    }

    /// Returns true if no cache is configured.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for CacheRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CacheRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("CacheRegistry")
            .field("order", &inner.order)
            .field("disabled", &inner.disabled)
            .finish()
    }
}
