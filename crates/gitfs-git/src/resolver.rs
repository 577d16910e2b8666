//! Resolution of (environment, path) across remotes.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, warn};

use crate::cache::CacheHealth;
use crate::error::GitFsError;
use crate::registry::{CacheRegistry, RefreshReport, RemoteFailure};
use crate::source::FileSource;

/// A file served by one remote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedFile {
    /// The remote that served the file (`url@cache_root`).
    pub remote: String,
    /// Short name of the ref the file was read from.
    pub ref_name: String,
    /// Commit the file was read at.
    pub commit: String,
    /// Path inside the repository.
    pub path: String,
    /// File content.
    #[serde(skip)]
    pub content: Vec<u8>,
    /// Present when the environment matched diverged refs of equal age.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ambiguity: Option<String>,
}

/// Result of resolving a file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    /// The first hit in precedence order.
    pub file: Option<ResolvedFile>,
    /// Remotes that failed and were skipped.
    pub failures: Vec<RemoteFailure>,
}

impl Resolution {
    /// Returns true if no remote had the file and at least one failed.
    pub fn is_degraded(&self) -> bool {
        self.file.is_none() && !self.failures.is_empty()
    }
}

/// Serves files from a registry's caches in configuration order.
///
/// Nothing is cached here: every call looks at the current snapshots.
#[derive(Debug, Clone)]
pub struct FileResolver {
    name: String,
    registry: Arc<CacheRegistry>,
}

impl FileResolver {
    /// Creates a resolver over a registry.
    pub fn new(registry: Arc<CacheRegistry>) -> Self {
        Self {
            name: "gitfs".to_string(),
            registry,
        }
    }

    /// Returns the registry.
    pub fn registry(&self) -> &Arc<CacheRegistry> {
        &self.registry
    }

    /// Finds `path` in the ref selected by `env`.
    ///
    /// The first cache with a hit wins. Caches that fail are recorded in
    /// [`Resolution::failures`] and skipped.
    pub async fn resolve(&self, env: &str, path: &str) -> Resolution {
        let mut failures = Vec::new();

        for cache in self.registry.active_caches() {
            match cache.lookup(env, path).await {
                Ok(Some(hit)) => {
                    debug!("Resolved {}:{} from {} at {}", env, path, cache.id(), hit.entry);
                    return Resolution {
                        file: Some(ResolvedFile {
                            remote: cache.id().to_string(),
                            ref_name: hit.entry.short_name().to_string(),
                            commit: hit.entry.commit.clone(),
                            path: hit.path,
                            content: hit.content,
                            ambiguity: hit.ambiguity.map(|e| e.to_string()),
                        }),
                        failures,
                    };
                },
                Ok(None) => continue,
                Err(e @ GitFsError::NotReady { .. }) => {
                    debug!("Skipping {}: {}", cache.id(), e);
                    failures.push(RemoteFailure::new(&cache.id(), &e));
                },
                Err(e) => {
                    warn!("Lookup of {}:{} in {} failed: {}", env, path, cache.id(), e);
                    failures.push(RemoteFailure::new(&cache.id(), &e));
                },
            }
        }

        Resolution {
            file: None,
            failures,
        }
    }

    /// Returns every environment the active caches can serve, sorted.
    pub fn envs(&self) -> Vec<String> {
        let mut envs: Vec<String> = self
            .registry
            .active_caches()
            .iter()
            .flat_map(|cache| cache.envs())
            .collect();
        envs.sort();
        envs.dedup();
        envs
    }
}

#[async_trait]
impl FileSource for FileResolver {
    async fn resolve(&self, env: &str, path: &str) -> Resolution {
        FileResolver::resolve(self, env, path).await
    }

    async fn envs(&self) -> Vec<String> {
        FileResolver::envs(self)
    }

    async fn refresh(&self) -> RefreshReport {
        self.registry.refresh_all().await
    }

    async fn health(&self) -> Vec<CacheHealth> {
        self.registry.health()
    }

    fn name(&self) -> &str {
        &self.name
    }
}
