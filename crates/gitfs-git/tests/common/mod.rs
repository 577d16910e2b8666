#![allow(dead_code)]
//! Shared helpers: an in-memory binding and on-disk git fixtures.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use gitfs_core::{Provider, RemoteConfig};
use gitfs_git::{
    BindingSelector, CacheRegistry, FetchResult, GitFsError, ProviderBinding, RefEntry, RepoHandle,
};
use parking_lot::Mutex;
use tempfile::TempDir;

const MARKER: &str = "FAKE_ID";

#[derive(Debug, Clone)]
struct FakeCommit {
    parent: Option<String>,
    time: i64,
    files: BTreeMap<String, Vec<u8>>,
}

#[derive(Debug, Clone, Default)]
struct FakeRepo {
    commits: HashMap<String, FakeCommit>,
    refs: BTreeMap<String, String>,
}

impl FakeRepo {
    fn list_refs(&self) -> Vec<RefEntry> {
        self.refs
            .iter()
            .filter_map(|(name, commit)| {
                let time = self.commits.get(commit).map_or(0, |c| c.time);
                RefEntry::from_full_name(name, commit.clone(), time)
            })
            .collect()
    }
}

/// In-memory provider binding.
///
/// Upstream repositories live in memory keyed by URL. A mirror directory
/// holds only a marker file naming its in-memory state, so deleting the
/// marker makes the mirror corrupt.
#[derive(Debug, Default)]
pub struct FakeBinding {
    upstream: Mutex<HashMap<String, FakeRepo>>,
    mirrors: Mutex<HashMap<u64, FakeRepo>>,
    unreachable: Mutex<HashSet<String>>,
    fetch_delay: Mutex<Duration>,
    next_id: AtomicU64,
    next_commit: AtomicU64,
    clones: AtomicUsize,
    fetches: AtomicUsize,
}

impl FakeBinding {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Commits `files` on top of `reference` (a full ref name) and moves it.
    pub fn commit(&self, url: &str, reference: &str, files: &[(&str, &str)], time: i64) -> String {
        let id = format!("{:040x}", self.next_commit.fetch_add(1, Ordering::SeqCst) + 1);
        let mut upstream = self.upstream.lock();
        let repo = upstream.entry(url.to_string()).or_default();

        let parent = repo.refs.get(reference).cloned();
        let mut tree = parent
            .as_ref()
            .and_then(|p| repo.commits.get(p))
            .map(|c| c.files.clone())
            .unwrap_or_default();
        for (path, content) in files {
            tree.insert(path.to_string(), content.as_bytes().to_vec());
        }

        repo.commits.insert(
            id.clone(),
            FakeCommit {
                parent,
                time,
                files: tree,
            },
        );
        repo.refs.insert(reference.to_string(), id.clone());
        id
    }

    /// Points `reference` at an existing commit.
    pub fn set_ref(&self, url: &str, reference: &str, commit: &str) {
        let mut upstream = self.upstream.lock();
        let repo = upstream.entry(url.to_string()).or_default();
        repo.refs.insert(reference.to_string(), commit.to_string());
    }

    /// Deletes a ref upstream.
    pub fn delete_ref(&self, url: &str, reference: &str) {
        if let Some(repo) = self.upstream.lock().get_mut(url) {
            repo.refs.remove(reference);
        }
    }

    /// Creates an upstream repository with no refs.
    pub fn empty_remote(&self, url: &str) {
        self.upstream.lock().entry(url.to_string()).or_default();
    }

    pub fn set_unreachable(&self, url: &str, unreachable: bool) {
        let mut set = self.unreachable.lock();
        if unreachable {
            set.insert(url.to_string());
        } else {
            set.remove(url);
        }
    }

    pub fn set_fetch_delay(&self, delay: Duration) {
        *self.fetch_delay.lock() = delay;
    }

    pub fn clone_count(&self) -> usize {
        self.clones.load(Ordering::SeqCst)
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Returns a selector that hands this binding to every cache.
    pub fn selector(self: &Arc<Self>) -> BindingSelector {
        let binding: Arc<dyn ProviderBinding> = self.clone();
        Arc::new(move |_: Provider| Arc::clone(&binding))
    }

    fn reach(&self, url: &str) -> Result<FakeRepo, GitFsError> {
        if self.unreachable.lock().contains(url) {
            return Err(GitFsError::unreachable(url, "connection refused"));
        }
        self.upstream
            .lock()
            .get(url)
            .cloned()
            .ok_or_else(|| GitFsError::unreachable(url, "repository not found"))
    }

    fn mirror_id(git_dir: &Path) -> Result<u64, GitFsError> {
        std::fs::read_to_string(git_dir.join(MARKER))
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .ok_or_else(|| GitFsError::corrupt(git_dir, "missing marker"))
    }

    fn mirror(&self, git_dir: &Path) -> Result<FakeRepo, GitFsError> {
        let id = Self::mirror_id(git_dir)?;
        self.mirrors
            .lock()
            .get(&id)
            .cloned()
            .ok_or_else(|| GitFsError::corrupt(git_dir, "unknown mirror"))
    }

    fn wait(&self, cancel: &AtomicBool, url: &str) -> Result<(), GitFsError> {
        let delay = *self.fetch_delay.lock();
        let deadline = Instant::now() + delay;
        while Instant::now() < deadline {
            if cancel.load(Ordering::SeqCst) {
                return Err(GitFsError::unreachable(url, "cancelled"));
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        Ok(())
    }
}

impl ProviderBinding for FakeBinding {
    fn provider(&self) -> Provider {
        Provider::Gix
    }

    fn clone_repo(
        &self,
        url: &str,
        destination: &Path,
        cancel: &AtomicBool,
    ) -> Result<RepoHandle, GitFsError> {
        let repo = self.reach(url)?;
        self.wait(cancel, url)?;
        if repo.refs.is_empty() {
            return Err(GitFsError::invalid_repository(url, "remote has no branches or tags"));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        std::fs::create_dir_all(destination)?;
        std::fs::write(destination.join(MARKER), id.to_string())?;
        self.mirrors.lock().insert(id, repo);
        self.clones.fetch_add(1, Ordering::SeqCst);

        Ok(RepoHandle::new(url, destination))
    }

    fn open(&self, url: &str, git_dir: &Path) -> Result<RepoHandle, GitFsError> {
        self.mirror(git_dir)?;
        Ok(RepoHandle::new(url, git_dir))
    }

    fn fetch(&self, handle: &RepoHandle, cancel: &AtomicBool) -> Result<FetchResult, GitFsError> {
        let id = Self::mirror_id(handle.git_dir())?;
        let before = self.mirror(handle.git_dir())?.list_refs();

        let repo = self.reach(handle.url())?;
        self.wait(cancel, handle.url())?;

        let after = repo.list_refs();
        self.mirrors.lock().insert(id, repo);
        self.fetches.fetch_add(1, Ordering::SeqCst);

        Ok(FetchResult::diff(&before, &after))
    }

    fn list_refs(&self, handle: &RepoHandle) -> Result<Vec<RefEntry>, GitFsError> {
        Ok(self.mirror(handle.git_dir())?.list_refs())
    }

    fn read_blob(
        &self,
        handle: &RepoHandle,
        commit: &str,
        path: &str,
    ) -> Result<Option<Vec<u8>>, GitFsError> {
        let repo = self.mirror(handle.git_dir())?;
        let commit = repo
            .commits
            .get(commit)
            .ok_or_else(|| GitFsError::corrupt(handle.git_dir(), "missing commit"))?;
        Ok(commit.files.get(path).cloned())
    }

    fn is_ancestor(
        &self,
        handle: &RepoHandle,
        ancestor: &str,
        descendant: &str,
    ) -> Result<bool, GitFsError> {
        let repo = self.mirror(handle.git_dir())?;
        let mut current = repo.commits.get(descendant).and_then(|c| c.parent.clone());
        while let Some(id) = current {
            if id == ancestor {
                return Ok(true);
            }
            current = repo.commits.get(&id).and_then(|c| c.parent.clone());
        }
        Ok(false)
    }
}

/// Builds a remote config with short timeouts.
pub fn remote(url: &str, cache_root: &Path) -> RemoteConfig {
    RemoteConfig::builder()
        .url(url)
        .cache_root(cache_root)
        .clone_timeout(Duration::from_secs(5))
        .fetch_timeout(Duration::from_secs(5))
        .build()
        .expect("valid test remote")
}

/// Builds a registry whose caches all use `binding`.
pub fn registry(binding: &Arc<FakeBinding>) -> Arc<CacheRegistry> {
    Arc::new(CacheRegistry::with_selector(binding.selector()))
}

/// Returns true if a `git` executable is on the path.
pub fn git_available() -> bool {
    std::process::Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// A bare upstream repository on disk, written through git2.
pub struct GitFixture {
    dir: TempDir,
    repo: git2::Repository,
}

impl GitFixture {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("temp dir");
        let repo = git2::Repository::init_bare(dir.path()).expect("init fixture");
        Self { dir, repo }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn url(&self) -> String {
        format!("file://{}", self.dir.path().display())
    }

    /// Commits `files` on `branch`, on top of its current tip.
    pub fn commit(&self, branch: &str, files: &[(&str, &[u8])], time: i64) -> git2::Oid {
        let reference = format!("refs/heads/{}", branch);
        let parent = self
            .repo
            .find_reference(&reference)
            .ok()
            .and_then(|r| r.peel_to_commit().ok());

        let baseline = match &parent {
            Some(commit) => commit.tree().expect("parent tree"),
            None => {
                let empty = self.repo.treebuilder(None).expect("treebuilder").write().expect("empty tree");
                self.repo.find_tree(empty).expect("find empty tree")
            },
        };

        let mut update = git2::build::TreeUpdateBuilder::new();
        for (path, content) in files {
            let blob = self.repo.blob(content).expect("write blob");
            update.upsert(*path, blob, git2::FileMode::Blob);
        }
        let tree_id = update.create_updated(&self.repo, &baseline).expect("update tree");
        let tree = self.repo.find_tree(tree_id).expect("find tree");

        let signature =
            git2::Signature::new("GitFS Test", "test@example.com", &git2::Time::new(time, 0))
                .expect("signature");
        let parents: Vec<&git2::Commit<'_>> = parent.iter().collect();

        self.repo
            .commit(
                Some(&reference),
                &signature,
                &signature,
                &format!("commit at {}", time),
                &tree,
                &parents,
            )
            .expect("commit")
    }

    /// Creates a lightweight tag.
    pub fn tag(&self, name: &str, target: git2::Oid) {
        self.repo
            .reference(&format!("refs/tags/{}", name), target, true, "tag")
            .expect("tag");
    }

    /// Creates an annotated tag.
    pub fn annotated_tag(&self, name: &str, target: git2::Oid, time: i64) {
        let object = self.repo.find_object(target, None).expect("tag target");
        let signature =
            git2::Signature::new("GitFS Test", "test@example.com", &git2::Time::new(time, 0))
                .expect("signature");
        self.repo
            .tag(name, &object, &signature, "release", true)
            .expect("annotated tag");
    }

    pub fn delete_ref(&self, name: &str) {
        self.repo
            .find_reference(name)
            .and_then(|mut r| r.delete())
            .expect("delete ref");
    }
}

/// Convenience for cache directories that outlive a single test step.
pub fn cache_dir() -> (TempDir, PathBuf) {
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().to_path_buf();
    (dir, path)
}
