//! Git provider bindings.
//!
//! A binding adapts one Git library to the operations a mirror needs:
//! clone, open, fetch, ref listing, blob reads and ancestry checks. Two
//! bindings exist, one per [`Provider`], and both must produce the same
//! refs and byte-identical blobs for the same remote content.
//!
//! Bindings are blocking; the cache runs them on the blocking thread pool.

mod gitoxide;
mod libgit2;

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, LazyLock};

use gitfs_core::Provider;
use serde::Serialize;
use tracing::{debug, warn};

pub use gitoxide::GixBinding;
pub use libgit2::Git2Binding;

use crate::error::GitFsError;
use crate::refs::{RefEntry, Selection, select_newest};

/// Refspecs used by every mirror: branches and tags map onto themselves.
pub const MIRROR_REFSPECS: [&str; 2] = ["+refs/heads/*:refs/heads/*", "+refs/tags/*:refs/tags/*"];

/// Handle to one on-disk bare mirror.
///
/// A handle is shared by `Arc` between the cache and in-flight readers. Once
/// retired, the mirror directory is deleted when the last holder drops it.
pub struct RepoHandle {
    url: String,
    git_dir: PathBuf,
    retired: AtomicBool,
}

impl RepoHandle {
    /// Creates a handle for the mirror of `url` stored at `git_dir`.
    pub fn new(url: impl Into<String>, git_dir: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            git_dir: git_dir.into(),
            retired: AtomicBool::new(false),
        }
    }

    /// Returns the remote URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns the mirror directory.
    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    /// Marks the mirror for deletion once no reader holds the handle.
    pub fn retire(&self) {
        self.retired.store(true, Ordering::SeqCst);
    }

    /// Cancels a pending deletion.
    pub fn reinstate(&self) {
        self.retired.store(false, Ordering::SeqCst);
    }

    /// Returns true if the mirror has been retired.
    pub fn is_retired(&self) -> bool {
        self.retired.load(Ordering::SeqCst)
    }
}

impl Drop for RepoHandle {
    fn drop(&mut self) {
        if !self.is_retired() {
            return;
        }
        match std::fs::remove_dir_all(&self.git_dir) {
            Ok(()) => debug!("Removed retired mirror {:?}", self.git_dir),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {},
            Err(e) => warn!("Failed to remove retired mirror {:?}: {}", self.git_dir, e),
        }
    }
}

impl fmt::Debug for RepoHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RepoHandle")
            .field("url", &self.url)
            .field("git_dir", &self.git_dir)
            .field("retired", &self.is_retired())
            .finish()
    }
}

/// Result of fetching a mirror.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchResult {
    /// True if any ref was added, moved or deleted.
    pub changed: bool,
    /// Full names of refs that are new or point at a different commit.
    pub new_refs: BTreeSet<String>,
}

impl FetchResult {
    /// A fetch that changed nothing.
    pub fn unchanged() -> Self {
        Self::default()
    }

    /// Compares ref lists taken before and after a fetch.
    pub fn diff(before: &[RefEntry], after: &[RefEntry]) -> Self {
        let old: HashMap<&str, &str> = before
            .iter()
            .map(|r| (r.name.as_str(), r.commit.as_str()))
            .collect();

        let new_refs: BTreeSet<String> = after
            .iter()
            .filter(|r| old.get(r.name.as_str()) != Some(&r.commit.as_str()))
            .map(|r| r.name.clone())
            .collect();

        let deleted = before
            .iter()
            .any(|b| !after.iter().any(|a| a.name == b.name));

        Self {
            changed: deleted || !new_refs.is_empty(),
            new_refs,
        }
    }
}

/// Operations a Git library must provide to back a mirror.
///
/// `cancel` flags passed to network operations abort the transfer when set;
/// an aborted operation leaves the mirror as it was before the call.
pub trait ProviderBinding: Send + Sync + fmt::Debug {
    /// The provider this binding implements.
    fn provider(&self) -> Provider;

    /// Clones `url` as a bare mirror into `destination`.
    ///
    /// # Errors
    ///
    /// - `RemoteUnreachable` on network or authentication failure
    /// - `InvalidRepository` if the URL is malformed or the remote has no refs
    fn clone_repo(
        &self,
        url: &str,
        destination: &Path,
        cancel: &AtomicBool,
    ) -> Result<RepoHandle, GitFsError>;

    /// Opens an existing mirror.
    ///
    /// # Errors
    ///
    /// `RepositoryCorrupt` if the directory is not a readable repository.
    fn open(&self, url: &str, git_dir: &Path) -> Result<RepoHandle, GitFsError>;

    /// Fetches all branches and tags, pruning refs deleted upstream.
    ///
    /// # Errors
    ///
    /// - `RemoteUnreachable` for transient transport failures
    /// - `RepositoryCorrupt` if the local mirror cannot be read or updated
    fn fetch(&self, handle: &RepoHandle, cancel: &AtomicBool) -> Result<FetchResult, GitFsError>;

    /// Lists branches and tags, peeled to commits and sorted by full name.
    fn list_refs(&self, handle: &RepoHandle) -> Result<Vec<RefEntry>, GitFsError>;

    /// Reads the blob at `path` in the tree of `commit`.
    ///
    /// Returns `None` if the path does not exist or is not a file.
    fn read_blob(
        &self,
        handle: &RepoHandle,
        commit: &str,
        path: &str,
    ) -> Result<Option<Vec<u8>>, GitFsError>;

    /// Returns true if `ancestor` is a proper ancestor of `descendant`.
    fn is_ancestor(
        &self,
        handle: &RepoHandle,
        ancestor: &str,
        descendant: &str,
    ) -> Result<bool, GitFsError>;

    /// Chooses among refs matching one environment, see [`select_newest`].
    ///
    /// The default asks [`is_ancestor`](Self::is_ancestor) pair by pair;
    /// bindings override it to keep one repository open for the whole choice.
    fn select(
        &self,
        handle: &RepoHandle,
        candidates: &[RefEntry],
    ) -> Result<Option<Selection>, GitFsError> {
        select_newest(candidates, |a: &str, b: &str| self.is_ancestor(handle, a, b))
    }

    /// Returns the repository root path.
    fn root_path<'a>(&self, handle: &'a RepoHandle) -> &'a Path {
        handle.git_dir()
    }
}

struct BindingTable {
    gix: Arc<dyn ProviderBinding>,
    git2: Arc<dyn ProviderBinding>,
}

static BINDINGS: LazyLock<BindingTable> = LazyLock::new(|| BindingTable {
    gix: Arc::new(GixBinding),
    git2: Arc::new(Git2Binding),
});

/// Returns the process-wide binding for a provider.
pub fn binding_for(provider: Provider) -> Arc<dyn ProviderBinding> {
    match provider {
        Provider::Gix => Arc::clone(&BINDINGS.gix),
        Provider::Git2 => Arc::clone(&BINDINGS.git2),
    }
}
