//! In-memory file source.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use gitfs_git::{
    CacheHealth, FileSource, RefreshReport, RefreshedRemote, RemoteFailure, Resolution,
    ResolvedFile,
};
use gitfs_git::gitfs_core::Provider;

pub const REMOTE: &str = "https://git.example.com/states.git@/var/cache/gitfs";

/// A [`FileSource`] answering from a fixed table.
#[derive(Default)]
pub struct MockSource {
    files: HashMap<(String, String), ResolvedFile>,
    failures: Vec<RemoteFailure>,
    envs: Vec<String>,
    refreshes: AtomicUsize,
}

impl MockSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serves `content` for `path` in `env`.
    pub fn with_file(mut self, env: &str, path: &str, content: &[u8]) -> Self {
        self.files.insert(
            (env.to_string(), path.to_string()),
            ResolvedFile {
                remote: REMOTE.to_string(),
                ref_name: if env == "base" { "main".to_string() } else { env.to_string() },
                commit: "a".repeat(40),
                path: path.to_string(),
                content: content.to_vec(),
                ambiguity: None,
            },
        );
        if !self.envs.iter().any(|e| e == env) {
            self.envs.push(env.to_string());
        }
        self
    }

    /// Marks the served file for `env`/`path` as chosen among ambiguous refs.
    pub fn with_ambiguity(mut self, env: &str, path: &str, message: &str) -> Self {
        if let Some(file) = self.files.get_mut(&(env.to_string(), path.to_string())) {
            file.ambiguity = Some(message.to_string());
        }
        self
    }

    /// Reports a failing remote on every call.
    pub fn with_failure(mut self, remote: &str, error: &str) -> Self {
        self.failures.push(RemoteFailure {
            remote: remote.to_string(),
            error: error.to_string(),
            transient: true,
        });
        self
    }

    pub fn refresh_count(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FileSource for MockSource {
    async fn resolve(&self, env: &str, path: &str) -> Resolution {
        Resolution {
            file: self.files.get(&(env.to_string(), path.to_string())).cloned(),
            failures: self.failures.clone(),
        }
    }

    async fn envs(&self) -> Vec<String> {
        let mut envs = self.envs.clone();
        envs.sort();
        envs
    }

    async fn refresh(&self) -> RefreshReport {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        RefreshReport {
            refreshed: vec![RefreshedRemote {
                remote: REMOTE.to_string(),
                changed: true,
                new_refs: ["refs/heads/main".to_string()].into_iter().collect(),
            }],
            failures: self.failures.clone(),
        }
    }

    async fn health(&self) -> Vec<CacheHealth> {
        vec![CacheHealth {
            remote: REMOTE.to_string(),
            provider: Provider::Gix,
            ready: true,
            healthy: true,
            generation: Some(1),
            refs: self.envs.len(),
            snapshot_age_secs: Some(5),
            seconds_since_fetch: Some(5),
            last_error: None,
            failure_count: 0,
        }]
    }

    fn name(&self) -> &str {
        "mock"
    }
}
