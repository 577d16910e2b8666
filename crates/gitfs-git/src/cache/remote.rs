//! A cache of one remote repository.

use std::fs;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use gitfs_core::{ConfigError, MountMap, Provider, RefPattern, RemoteConfig, RemoteId};
use serde::Serialize;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, warn};

use super::mirror::{Mirror, Snapshot};
use crate::error::GitFsError;
use crate::provider::{FetchResult, ProviderBinding};
use crate::refs::RefEntry;
use crate::sync::RefreshConfig;

/// A file found in a cache.
#[derive(Debug)]
pub struct CachedFile {
    /// The ref the file was read from.
    pub entry: RefEntry,
    /// Path inside the repository.
    pub path: String,
    /// File content.
    pub content: Vec<u8>,
    /// Set when several diverged refs matched and the choice fell back to
    /// ref-name order.
    pub ambiguity: Option<GitFsError>,
}

/// Health of one cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheHealth {
    pub remote: String,
    pub provider: Provider,
    pub ready: bool,
    /// True if the last clone or fetch succeeded.
    pub healthy: bool,
    pub generation: Option<u64>,
    pub refs: usize,
    /// Age of the refs being served.
    pub snapshot_age_secs: Option<u64>,
    pub seconds_since_fetch: Option<u64>,
    pub last_error: Option<String>,
    pub failure_count: u32,
}

/// Owns the mirror of one remote and serves files from it.
///
/// Clones and fetches are serialized by the mirror's fetch lock and bounded
/// by the configured timeouts. Lookups never wait for a fetch: they read the
/// last installed [`Snapshot`] by commit id.
pub struct RemoteCache {
    config: RemoteConfig,
    binding: Arc<dyn ProviderBinding>,
    mirror: Arc<Mirror>,
    mount: MountMap,
}

impl RemoteCache {
    /// Creates a cache with a fresh mirror.
    pub fn new(config: RemoteConfig, binding: Arc<dyn ProviderBinding>) -> Result<Self, GitFsError> {
        let mirror = Arc::new(Mirror::new(config.id())?);
        Self::with_mirror(config, binding, mirror)
    }

    /// Creates a cache over an existing mirror of the same remote.
    pub fn with_mirror(
        config: RemoteConfig,
        binding: Arc<dyn ProviderBinding>,
        mirror: Arc<Mirror>,
    ) -> Result<Self, GitFsError> {
        config.validate()?;
        if *mirror.id() != config.id() {
            return Err(ConfigError::invalid("url", "mirror belongs to a different remote").into());
        }
        let mount = config.mount_map()?;

        Ok(Self {
            config,
            binding,
            mirror,
            mount,
        })
    }

    /// Returns the remote identity.
    pub fn id(&self) -> RemoteId {
        self.config.id()
    }

    /// Returns the configuration.
    pub fn config(&self) -> &RemoteConfig {
        &self.config
    }

    /// Returns the binding maintaining the mirror.
    pub fn binding(&self) -> &Arc<dyn ProviderBinding> {
        &self.binding
    }

    pub(crate) fn mirror(&self) -> &Arc<Mirror> {
        &self.mirror
    }

    /// Returns the current snapshot, if the mirror has been cloned.
    pub fn snapshot(&self) -> Option<Arc<Snapshot>> {
        self.mirror.current()
    }

    /// Returns true once a snapshot is installed.
    pub fn is_ready(&self) -> bool {
        self.mirror.current().is_some()
    }

    /// Makes sure a snapshot is installed.
    ///
    /// Reuses the newest valid generation on disk, otherwise clones a new one.
    pub async fn ensure_cloned(&self) -> Result<(), GitFsError> {
        if self.is_ready() {
            return Ok(());
        }

        let guard = self.mirror.lock().await;
        if self.is_ready() {
            return Ok(());
        }

        let (binding, mirror, url) = self.blocking_parts();
        let result = run_blocking(self.config.clone_timeout(), guard, move |cancel| {
            open_or_clone(binding.as_ref(), &mirror, &url, cancel)
        })
        .await;

        match result {
            Ok(cloned) => {
                if cloned {
                    self.mirror.state().record_success();
                }
                Ok(())
            },
            Err(e) => {
                self.mirror.state().record_failure(e.to_string());
                Err(e)
            },
        }
    }

    /// Fetches the remote and installs the new snapshot.
    ///
    /// Clones first if the cache has no snapshot. A corrupt mirror is
    /// re-cloned into a new generation; the old one is deleted once its
    /// readers finish. On failure the current snapshot stays in place.
    pub async fn refresh(&self) -> Result<FetchResult, GitFsError> {
        let result = self.refresh_locked().await;

        match &result {
            Ok(fetch) => {
                self.mirror.state().record_success();
                if fetch.changed {
                    info!(
                        "Refreshed {}: {} ref(s) updated",
                        self.id(),
                        fetch.new_refs.len()
                    );
                } else {
                    debug!("Refreshed {}: no changes", self.id());
                }
            },
            Err(e) => {
                self.mirror.state().record_failure(e.to_string());
                warn!("Refresh of {} failed: {}", self.id(), e);
            },
        }
        result
    }

    async fn refresh_locked(&self) -> Result<FetchResult, GitFsError> {
        let guard = self.mirror.lock().await;
        let seen = self.mirror.current().map(|s| s.generation());

        let timeout = match seen {
            Some(_) => self.config.fetch_timeout(),
            None => self.config.clone_timeout() + self.config.fetch_timeout(),
        };

        let (binding, mirror, url) = self.blocking_parts();
        let result = run_blocking(timeout, guard, move |cancel| {
            fetch_or_clone(binding.as_ref(), &mirror, &url, cancel)
        })
        .await;

        match result {
            Err(e) if e.requires_reclone() => {
                warn!("Mirror of {} is corrupt, re-cloning: {}", self.id(), e);
                self.reclone(seen).await
            },
            other => other,
        }
    }

    /// Replaces generation `corrupt` with a fresh clone.
    async fn reclone(&self, corrupt: Option<u64>) -> Result<FetchResult, GitFsError> {
        let guard = self.mirror.lock().await;

        let (binding, mirror, url) = self.blocking_parts();
        run_blocking(self.config.clone_timeout(), guard, move |cancel| {
            let current = mirror.current();
            if current.as_ref().map(|s| s.generation()) != corrupt {
                debug!("Mirror of {} was already replaced", url);
                return Ok(FetchResult::unchanged());
            }

            let before = current.map(|s| s.refs().to_vec()).unwrap_or_default();
            let snapshot = clone_generation(binding.as_ref(), &mirror, &url, cancel)?;
            let result = FetchResult::diff(&before, snapshot.refs());

            if let Some(old) = mirror.install(snapshot) {
                old.handle().retire();
            }
            Ok(result)
        })
        .await
    }

    /// Looks up `path` in the ref selected by `env`.
    ///
    /// Returns `Ok(None)` when no allowed ref matches or the path does not
    /// exist at the chosen commit.
    ///
    /// # Errors
    ///
    /// `NotReady` if the cache has never been cloned.
    pub async fn lookup(&self, env: &str, path: &str) -> Result<Option<CachedFile>, GitFsError> {
        let Some(snapshot) = self.mirror.current() else {
            return Err(GitFsError::NotReady {
                url: self.config.url().to_string(),
            });
        };

        let Some(repo_path) = self.mount.to_repo_path(path) else {
            debug!("{} is outside {}", path, self.id());
            return Ok(None);
        };

        let pattern = RefPattern::lenient(self.config.env_ref(env));
        let candidates: Vec<RefEntry> = snapshot
            .refs()
            .iter()
            .filter(|r| self.config.refs().permits(r.short_name()) && pattern.matches(r.short_name()))
            .cloned()
            .collect();
        if candidates.is_empty() {
            debug!("No ref of {} matches '{}'", self.id(), pattern);
            return Ok(None);
        }

        let binding = Arc::clone(&self.binding);
        tokio::task::spawn_blocking(move || -> Result<Option<CachedFile>, GitFsError> {
            let handle = snapshot.handle();
            let Some(selection) = binding.select(handle, &candidates)? else {
                return Ok(None);
            };

            let ambiguity = selection.is_ambiguous().then(|| GitFsError::RefAmbiguous {
                pattern: pattern.to_string(),
                chosen: selection.chosen.short_name().to_string(),
                candidates: selection.ambiguous_with.clone(),
            });
            if let Some(err) = &ambiguity {
                warn!("{}", err);
            }

            let content = binding.read_blob(handle, &selection.chosen.commit, &repo_path)?;
            Ok(content.map(|content| CachedFile {
                entry: selection.chosen,
                path: repo_path,
                content,
                ambiguity,
            }))
        })
        .await?
    }

    /// Returns the environments this cache can serve.
    ///
    /// These are the short names of allowed refs, plus `base` when the base
    /// ref exists.
    pub fn envs(&self) -> Vec<String> {
        let Some(snapshot) = self.mirror.current() else {
            return Vec::new();
        };

        let mut envs: Vec<String> = snapshot
            .refs()
            .iter()
            .map(RefEntry::short_name)
            .filter(|name| self.config.refs().permits(name))
            .map(str::to_string)
            .collect();

        let base = RefPattern::lenient(self.config.base());
        if envs.iter().any(|name| base.matches(name)) {
            envs.push("base".to_string());
        }

        envs.sort();
        envs.dedup();
        envs
    }

    /// Returns true if the cooldown since the last attempt has elapsed.
    pub fn is_due(&self, config: &RefreshConfig) -> bool {
        self.mirror.state().is_due(config)
    }

    /// Returns the health of this cache.
    pub fn health(&self) -> CacheHealth {
        let snapshot = self.mirror.current();
        let state = self.mirror.state();

        CacheHealth {
            remote: self.id().to_string(),
            provider: self.binding.provider(),
            ready: snapshot.is_some(),
            healthy: state.is_healthy(),
            generation: snapshot.as_ref().map(|s| s.generation()),
            refs: snapshot.as_ref().map_or(0, |s| s.refs().len()),
            snapshot_age_secs: snapshot.as_ref().map(|s| s.fetched_at().elapsed().as_secs()),
            seconds_since_fetch: state.time_since_fetch().map(|d| d.as_secs()),
            last_error: state.last_error(),
            failure_count: state.failure_count(),
        }
    }

    /// Retires the mirror; its directory is deleted after in-flight lookups.
    pub fn retire(&self) {
        self.mirror.retire();
    }

    fn blocking_parts(&self) -> (Arc<dyn ProviderBinding>, Arc<Mirror>, String) {
        (
            Arc::clone(&self.binding),
            Arc::clone(&self.mirror),
            self.config.url().to_string(),
        )
    }
}

impl std::fmt::Debug for RemoteCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteCache")
            .field("id", &self.id())
            .field("provider", &self.binding.provider())
            .field("ready", &self.is_ready())
            .finish()
    }
}

/// Runs `op` on the blocking pool while holding the fetch lock.
///
/// On timeout the cancel flag is raised and `Timeout` is returned at once;
/// the lock stays held by the task until `op` actually returns.
async fn run_blocking<T, F>(
    timeout: Duration,
    guard: OwnedMutexGuard<()>,
    op: F,
) -> Result<T, GitFsError>
where
    T: Send + 'static,
    F: FnOnce(&AtomicBool) -> Result<T, GitFsError> + Send + 'static,
{
    let cancel = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&cancel);

    let task = tokio::task::spawn_blocking(move || {
        let _guard = guard;
        op(&flag)
    });

    match tokio::time::timeout(timeout, task).await {
        Ok(joined) => joined?,
        Err(_) => {
            cancel.store(true, Ordering::SeqCst);
            Err(GitFsError::Timeout {
                seconds: timeout.as_secs(),
            })
        },
    }
}

/// Installs the newest usable generation on disk, cloning if there is none.
///
/// Returns true if a clone was made.
fn open_or_clone(
    binding: &dyn ProviderBinding,
    mirror: &Mirror,
    url: &str,
    cancel: &AtomicBool,
) -> Result<bool, GitFsError> {
    let layout = mirror.layout();
    fs::create_dir_all(layout.base())?;

    for generation in layout.generations()?.into_iter().rev() {
        let dir = layout.generation_dir(generation);
        let opened = binding
            .open(url, &dir)
            .and_then(|handle| binding.list_refs(&handle).map(|refs| (handle, refs)));

        match opened {
            Ok((handle, refs)) if !refs.is_empty() => {
                info!("Reusing generation {} of {}", generation, url);
                layout.remove_stale(Some(generation))?;
                mirror.install(Snapshot::new(Arc::new(handle), refs, generation));
                return Ok(false);
            },
            Ok(_) => warn!("Generation {} of {} has no refs, discarding", generation, url),
            Err(e) => warn!("Generation {} of {} is unusable: {}", generation, url, e),
        }
    }

    layout.remove_stale(None)?;
    let snapshot = clone_generation(binding, mirror, url, cancel)?;
    mirror.install(snapshot);
    Ok(true)
}

/// Fetches into the current generation, cloning first if there is none.
fn fetch_or_clone(
    binding: &dyn ProviderBinding,
    mirror: &Mirror,
    url: &str,
    cancel: &AtomicBool,
) -> Result<FetchResult, GitFsError> {
    let current = match mirror.current() {
        Some(current) => current,
        None => {
            let cloned = open_or_clone(binding, mirror, url, cancel)?;
            let current = mirror.current().ok_or_else(|| GitFsError::NotReady {
                url: url.to_string(),
            })?;
            if cloned {
                return Ok(FetchResult::diff(&[], current.refs()));
            }
            current
        },
    };

    let handle = current.handle();
    let fetched = binding.fetch(handle, cancel)?;
    debug!("Fetched {}: {} ref(s) moved on disk", url, fetched.new_refs.len());

    let refs = binding.list_refs(handle)?;
    let result = FetchResult::diff(current.refs(), &refs);
    if result.changed {
        mirror.install(Snapshot::new(Arc::clone(handle), refs, current.generation()));
    }
    Ok(result)
}

/// Clones `url` into the next generation through a staging directory.
fn clone_generation(
    binding: &dyn ProviderBinding,
    mirror: &Mirror,
    url: &str,
    cancel: &AtomicBool,
) -> Result<Snapshot, GitFsError> {
    let layout = mirror.layout();
    let generation = layout.next_generation()?;
    let staging = layout.staging_dir(generation);

    if staging.exists() {
        fs::remove_dir_all(&staging)?;
    }
    fs::create_dir_all(&staging)?;

    info!("Cloning {} into generation {}", url, generation);
    if let Err(e) = binding.clone_repo(url, &staging, cancel) {
        if let Err(cleanup) = fs::remove_dir_all(&staging) {
            warn!("Failed to remove {:?}: {}", staging, cleanup);
        }
        return Err(e);
    }

    let target = layout.generation_dir(generation);
    fs::rename(&staging, &target)?;

    let handle = binding.open(url, &target)?;
    let refs = binding.list_refs(&handle)?;
    info!("Cloned {} ({} refs)", url, refs.len());

    Ok(Snapshot::new(Arc::new(handle), refs, generation))
}
