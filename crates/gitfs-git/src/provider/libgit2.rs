//! Binding backed by libgit2.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use git2::{
    AutotagOption, Cred, CredentialType, ErrorClass, ErrorCode, FetchOptions, FetchPrune, ObjectType,
    Oid, RemoteCallbacks, Repository,
};
use gitfs_core::Provider;
use tracing::trace;

use super::{FetchResult, MIRROR_REFSPECS, ProviderBinding, RepoHandle};
use crate::error::GitFsError;
use crate::refs::{RefEntry, Selection, select_newest};

/// Provider binding using libgit2.
#[derive(Debug, Default, Clone, Copy)]
pub struct Git2Binding;

impl Git2Binding {
    fn open_repo(git_dir: &Path) -> Result<Repository, GitFsError> {
        Repository::open_bare(git_dir).map_err(|e| GitFsError::corrupt(git_dir, e))
    }

    fn fetch_into(
        repo: &Repository,
        url: &str,
        cancel: &AtomicBool,
    ) -> Result<(), GitFsError> {
        let mut remote = repo
            .remote_anonymous(url)
            .map_err(|e| GitFsError::invalid_repository(url, e))?;

        let git_config = git2::Config::open_default()
            .or_else(|_| git2::Config::new())
            .map_err(|e| GitFsError::corrupt(repo.path(), e))?;

        let mut callbacks = RemoteCallbacks::new();
        callbacks.credentials(|url, username, allowed_types| {
            trace!(
                "Requested credentials for {}, username {:?}, allowed types {:?}",
                url, username, allowed_types
            );
            if allowed_types.contains(CredentialType::USERNAME) {
                return Cred::username("git");
            }
            if allowed_types.contains(CredentialType::SSH_KEY) {
                return Cred::ssh_key_from_agent(username.unwrap_or("git"));
            }
            if allowed_types.contains(CredentialType::USER_PASS_PLAINTEXT) {
                return Cred::credential_helper(&git_config, url, username);
            }
            Err(git2::Error::from_str("no valid authentication available"))
        });
        callbacks.transfer_progress(|_| !cancel.load(Ordering::Relaxed));

        let mut options = FetchOptions::new();
        options
            .remote_callbacks(callbacks)
            .download_tags(AutotagOption::None)
            .prune(FetchPrune::On);

        remote
            .fetch(&MIRROR_REFSPECS, Some(&mut options), None)
            .map_err(|e| transfer_error(url, repo.path(), e))
    }

    fn refs_of(repo: &Repository) -> Result<Vec<RefEntry>, GitFsError> {
        let mut entries = Vec::new();

        for reference in repo.references().map_err(|e| GitFsError::corrupt(repo.path(), e))? {
            let reference = reference.map_err(|e| GitFsError::corrupt(repo.path(), e))?;
            let Some(name) = reference.name() else {
                continue;
            };
            if !name.starts_with("refs/heads/") && !name.starts_with("refs/tags/") {
                continue;
            }

            let commit = match reference.peel_to_commit() {
                Ok(commit) => commit,
                Err(e) => {
                    trace!("Skipping {}: {}", name, e);
                    continue;
                },
            };

            entries.extend(RefEntry::from_full_name(
                name,
                commit.id().to_string(),
                commit.time().seconds(),
            ));
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    fn descends(
        repo: &Repository,
        git_dir: &Path,
        ancestor: &str,
        descendant: &str,
    ) -> Result<bool, GitFsError> {
        let ancestor = Self::oid(git_dir, ancestor)?;
        let descendant = Self::oid(git_dir, descendant)?;
        repo.graph_descendant_of(descendant, ancestor)
            .map_err(|e| GitFsError::corrupt(git_dir, e))
    }

    fn oid(git_dir: &Path, hex: &str) -> Result<Oid, GitFsError> {
        Oid::from_str(hex)
            .map_err(|e| GitFsError::corrupt(git_dir, format!("bad object id {}: {}", hex, e)))
    }
}

/// Classifies a failed transfer.
///
/// Failures in the local object or ref store mean the mirror is damaged;
/// everything else is treated as the remote side being unavailable.
fn transfer_error(url: &str, git_dir: &Path, error: git2::Error) -> GitFsError {
    if matches!(error.code(), ErrorCode::Auth | ErrorCode::Certificate | ErrorCode::User) {
        return GitFsError::unreachable(url, error.message());
    }
    match error.class() {
        ErrorClass::Odb
        | ErrorClass::Indexer
        | ErrorClass::Zlib
        | ErrorClass::Sha1
        | ErrorClass::Object
        | ErrorClass::Reference => GitFsError::corrupt(git_dir, error.message()),
        _ => GitFsError::unreachable(url, error.message()),
    }
}

impl ProviderBinding for Git2Binding {
    fn provider(&self) -> Provider {
        Provider::Git2
    }

    fn clone_repo(
        &self,
        url: &str,
        destination: &Path,
        cancel: &AtomicBool,
    ) -> Result<RepoHandle, GitFsError> {
        let repo = Repository::init_bare(destination).map_err(|e| GitFsError::corrupt(destination, e))?;

        Self::fetch_into(&repo, url, cancel)?;

        if Self::refs_of(&repo)?.is_empty() {
            return Err(GitFsError::invalid_repository(
                url,
                "remote has no branches or tags",
            ));
        }

        Ok(RepoHandle::new(url, destination))
    }

    fn open(&self, url: &str, git_dir: &Path) -> Result<RepoHandle, GitFsError> {
        Self::open_repo(git_dir)?;
        Ok(RepoHandle::new(url, git_dir))
    }

    fn fetch(&self, handle: &RepoHandle, cancel: &AtomicBool) -> Result<FetchResult, GitFsError> {
        let repo = Self::open_repo(handle.git_dir())?;
        let before = Self::refs_of(&repo)?;

        Self::fetch_into(&repo, handle.url(), cancel)?;

        let after = Self::refs_of(&repo)?;
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
        let git_dir = handle.git_dir();
        let repo = Self::open_repo(git_dir)?;

        let commit = repo
            .find_commit(Self::oid(git_dir, commit)?)
            .map_err(|e| GitFsError::corrupt(git_dir, e))?;
        let tree = commit.tree().map_err(|e| GitFsError::corrupt(git_dir, e))?;

        let entry = match tree.get_path(Path::new(path)) {
            Ok(entry) => entry,
            Err(e) if e.code() == ErrorCode::NotFound => return Ok(None),
            Err(e) => return Err(GitFsError::corrupt(git_dir, e)),
        };
        if entry.kind() != Some(ObjectType::Blob) {
            return Ok(None);
        }

        let blob = repo
            .find_blob(entry.id())
            .map_err(|e| GitFsError::corrupt(git_dir, e))?;
        Ok(Some(blob.content().to_vec()))
    }

    fn is_ancestor(
        &self,
        handle: &RepoHandle,
        ancestor: &str,
        descendant: &str,
    ) -> Result<bool, GitFsError> {
        let repo = Self::open_repo(handle.git_dir())?;
        Self::descends(&repo, handle.git_dir(), ancestor, descendant)
    }

    fn select(
        &self,
        handle: &RepoHandle,
        candidates: &[RefEntry],
    ) -> Result<Option<Selection>, GitFsError> {
        let git_dir = handle.git_dir();
        let repo = Self::open_repo(git_dir)?;
        select_newest(candidates, |a: &str, b: &str| Self::descends(&repo, git_dir, a, b))
    }
}
