//! Binding backed by gix (pure Rust).

use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::atomic::AtomicBool;

use gitfs_core::Provider;
use gix::bstr::ByteSlice;
use gix::remote::Direction;
use tracing::{debug, trace};

use super::{FetchResult, MIRROR_REFSPECS, ProviderBinding, RepoHandle};
use crate::error::GitFsError;
use crate::refs::{RefEntry, Selection, select_newest};

const ANCESTRY_CACHE_BYTES: usize = 4 * 1024 * 1024;

/// Provider binding using gix.
///
/// Local `file://` and path remotes go through `git-upload-pack`, so those
/// need a git executable on the path; network transports do not.
#[derive(Debug, Default, Clone, Copy)]
pub struct GixBinding;

impl GixBinding {
    fn open_repo(git_dir: &Path) -> Result<gix::Repository, GitFsError> {
        gix::open(git_dir).map_err(|e| GitFsError::corrupt(git_dir, e))
    }

    /// Fetches branches and tags into `repo`, returning the names the remote advertised.
    fn fetch_into(
        repo: &gix::Repository,
        uri: &str,
        cancel: &AtomicBool,
    ) -> Result<HashSet<String>, GitFsError> {
        let url = gix::url::parse(uri.into())
            .map_err(|e| GitFsError::invalid_repository(uri, format!("invalid URL: {}", e)))?;

        let remote = repo
            .remote_at(url)
            .map_err(|e| GitFsError::invalid_repository(uri, e))?
            .with_refspecs(MIRROR_REFSPECS, Direction::Fetch)
            .map_err(|e| GitFsError::invalid_repository(uri, e))?
            .with_fetch_tags(gix::remote::fetch::Tags::None);

        let outcome = remote
            .connect(Direction::Fetch)
            .map_err(|e| GitFsError::unreachable(uri, format!("failed to connect: {}", e)))?
            .prepare_fetch(gix::progress::Discard, Default::default())
            .map_err(|e| GitFsError::unreachable(uri, format!("failed to prepare fetch: {}", e)))?
            .receive(gix::progress::Discard, cancel)
            .map_err(|e| receive_error(uri, repo.git_dir(), e))?;

        Ok(outcome
            .ref_map
            .remote_refs
            .iter()
            .map(|r| r.unpack().0.to_str_lossy().into_owned())
            .collect())
    }

    /// Deletes local branches and tags the remote no longer advertises.
    fn prune(
        repo: &gix::Repository,
        local: &[RefEntry],
        advertised: &HashSet<String>,
    ) -> Result<(), GitFsError> {
        for entry in local.iter().filter(|r| !advertised.contains(&r.name)) {
            debug!("Pruning {} from {:?}", entry.name, repo.git_dir());
            let reference = repo
                .find_reference(entry.name.as_str())
                .map_err(|e| GitFsError::corrupt(repo.git_dir(), e))?;
            reference
                .delete()
                .map_err(|e| GitFsError::corrupt(repo.git_dir(), e))?;
        }
        Ok(())
    }

    fn refs_of(repo: &gix::Repository) -> Result<Vec<RefEntry>, GitFsError> {
        let corrupt = |e: &dyn std::fmt::Display| GitFsError::corrupt(repo.git_dir(), e);

        let platform = repo.references().map_err(|e| corrupt(&e))?;
        let mut entries = Vec::new();

        for reference in platform.all().map_err(|e| corrupt(&e))? {
            let mut reference = reference.map_err(|e| corrupt(&e))?;
            let Ok(name) = reference.name().as_bstr().to_str().map(str::to_string) else {
                continue;
            };
            if !name.starts_with("refs/heads/") && !name.starts_with("refs/tags/") {
                continue;
            }

            let id = match reference.peel_to_id_in_place() {
                Ok(id) => id.detach(),
                Err(e) => {
                    trace!("Skipping {}: {}", name, e);
                    continue;
                },
            };
            // Tags may point at trees or blobs; only commits are served.
            let Ok(commit) = repo.find_commit(id) else {
                trace!("Skipping {}: not a commit", name);
                continue;
            };
            let time = commit.time().map_err(|e| corrupt(&e))?.seconds;

            entries.extend(RefEntry::from_full_name(&name, id.to_string(), time));
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    fn descends(repo: &gix::Repository, ancestor: &str, descendant: &str) -> Result<bool, GitFsError> {
        let ancestor = Self::object_id(repo, ancestor)?;
        let descendant = Self::object_id(repo, descendant)?;
        if ancestor == descendant {
            return Ok(false);
        }

        match repo.merge_base(ancestor, descendant) {
            Ok(base) => Ok(base.detach() == ancestor),
            Err(gix::repository::merge_base::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(GitFsError::corrupt(repo.git_dir(), e)),
        }
    }

    fn object_id(repo: &gix::Repository, hex: &str) -> Result<gix::ObjectId, GitFsError> {
        gix::ObjectId::from_hex(hex.as_bytes())
            .map_err(|e| GitFsError::corrupt(repo.git_dir(), format!("bad object id {}: {}", hex, e)))
    }
}

impl ProviderBinding for GixBinding {
    fn provider(&self) -> Provider {
        Provider::Gix
    }

    fn clone_repo(
        &self,
        url: &str,
        destination: &Path,
        cancel: &AtomicBool,
    ) -> Result<RepoHandle, GitFsError> {
        let repo = gix::init_bare(destination).map_err(|e| GitFsError::corrupt(destination, e))?;

        Self::fetch_into(&repo, url, cancel)?;

        let repo = Self::open_repo(destination)?;
        if Self::refs_of(&repo)?.is_empty() {
            return Err(GitFsError::invalid_repository(
                url,
                "remote has no branches or tags",
            ));
        }

        Ok(RepoHandle::new(url, destination))
    }

    fn open(&self, url: &str, git_dir: &Path) -> Result<RepoHandle, GitFsError> {
        let repo = Self::open_repo(git_dir)?;
        if !repo.is_bare() {
            return Err(GitFsError::corrupt(git_dir, "not a bare repository"));
        }
        Ok(RepoHandle::new(url, git_dir))
    }

    fn fetch(&self, handle: &RepoHandle, cancel: &AtomicBool) -> Result<FetchResult, GitFsError> {
        let repo = Self::open_repo(handle.git_dir())?;
        let before = Self::refs_of(&repo)?;

        let advertised = Self::fetch_into(&repo, handle.url(), cancel)?;

        // Reopen so the ref store reflects the fetch.
        let repo = Self::open_repo(handle.git_dir())?;
        Self::prune(&repo, &Self::refs_of(&repo)?, &advertised)?;

        let after = Self::refs_of(&Self::open_repo(handle.git_dir())?)?;
        Ok(FetchResult::diff(&before, &after))
    }

    fn list_refs(&self, handle: &RepoHandle) -> Result<Vec<RefEntry>, GitFsError> {
        Self::refs_of(&Self::open_repo(handle.git_dir())?)
    }

    fn read_blob(
        &self,
        handle: &RepoHandle,
        commit: &str,
        path: &str,
    ) -> Result<Option<Vec<u8>>, GitFsError> {
        let repo = Self::open_repo(handle.git_dir())?;
        let corrupt = |e: &dyn std::fmt::Display| GitFsError::corrupt(handle.git_dir(), e);

        let id = Self::object_id(&repo, commit)?;
        let commit = repo.find_commit(id).map_err(|e| corrupt(&e))?;
        let tree = commit.tree().map_err(|e| corrupt(&e))?;

        let Some(entry) = tree.lookup_entry_by_path(path).map_err(|e| corrupt(&e))? else {
            return Ok(None);
        };
        // Submodule entries name commits from another repository.
        if entry.mode().is_commit() {
            return Ok(None);
        }

        let object = entry.object().map_err(|e| corrupt(&e))?;
        if object.kind != gix::object::Kind::Blob {
            return Ok(None);
        }
        Ok(Some(object.detach().data))
    }

    fn is_ancestor(
        &self,
        handle: &RepoHandle,
        ancestor: &str,
        descendant: &str,
    ) -> Result<bool, GitFsError> {
        let repo = Self::open_repo(handle.git_dir())?;
        Self::descends(&repo, ancestor, descendant)
    }

    fn select(
        &self,
        handle: &RepoHandle,
        candidates: &[RefEntry],
    ) -> Result<Option<Selection>, GitFsError> {
        let mut repo = Self::open_repo(handle.git_dir())?;
        repo.object_cache_size_if_unset(ANCESTRY_CACHE_BYTES);
        select_newest(candidates, |a: &str, b: &str| Self::descends(&repo, a, b))
    }
}

/// Classifies a failed `receive`.
///
/// Failures writing the pack, the refs or the shallow file are local damage;
/// everything else happened on the way to or from the remote.
fn receive_error(uri: &str, git_dir: &Path, error: gix::remote::fetch::Error) -> GitFsError {
    use gix::protocol::fetch::Error as Protocol;
    use gix::remote::fetch::Error;

    let local = match &error {
        Error::UpdateRefs(_)
        | Error::RemovePackKeepFile { .. }
        | Error::LoadAlternates(_)
        | Error::IncompatibleObjectHash { .. } => true,
        Error::Fetch(
            Protocol::WriteShallowFile(_) | Protocol::ReadShallowFile(_) | Protocol::LockShallowFile(_),
        ) => true,
        Error::Fetch(Protocol::ConsumePack(source)) => !network_io(source.as_ref()),
        _ => false,
    };

    if local {
        GitFsError::corrupt(git_dir, format!("fetch failed: {}", error))
    } else {
        GitFsError::unreachable(uri, format!("fetch failed: {}", error))
    }
}

/// Returns true if the first I/O error in the source chain is a network failure.
fn network_io(error: &(dyn std::error::Error + 'static)) -> bool {
    let mut current = Some(error);
    while let Some(e) = current {
        if let Some(io) = e.downcast_ref::<std::io::Error>() {
            return matches!(
                io.kind(),
                ErrorKind::ConnectionRefused
                    | ErrorKind::ConnectionReset
                    | ErrorKind::ConnectionAborted
                    | ErrorKind::NotConnected
                    | ErrorKind::BrokenPipe
                    | ErrorKind::TimedOut
                    | ErrorKind::UnexpectedEof
                    | ErrorKind::Interrupted
            );
        }
        current = e.source();
    }
    false
}
