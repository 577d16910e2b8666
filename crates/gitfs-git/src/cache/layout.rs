//! On-disk layout of mirror generations.
//!
//! ```text
//! <cache_root>/gitfs/<slug>/
//!     1/                 bare mirror, generation 1
//!     2/                 bare mirror, generation 2 (after a re-clone)
//!     .staging-3/        clone in progress
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use git2::{ObjectType, Oid};
use gitfs_core::RemoteId;
use tracing::{debug, warn};

use crate::error::GitFsError;

const STAGING_PREFIX: &str = ".staging-";
const SLUG_NAME_LEN: usize = 48;

/// Returns the directory name used for a remote's mirrors.
///
/// The name is the URL with every non-alphanumeric character replaced,
/// followed by 12 hex digits of a blob hash of the URL and cache root.
pub fn slug(id: &RemoteId) -> Result<String, GitFsError> {
    let key = format!("{}\n{}", id.url(), id.cache_root().display());
    let hash = Oid::hash_object(ObjectType::Blob, key.as_bytes())
        .map_err(|e| GitFsError::Task(format!("failed to hash remote id: {}", e)))?
        .to_string();

    let name: String = id
        .url()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .take(SLUG_NAME_LEN)
        .collect();

    Ok(format!("{}-{}", name.trim_matches('_'), &hash[..12]))
}

/// Paths of the mirror generations of one remote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorLayout {
    base: PathBuf,
}

impl MirrorLayout {
    /// Computes the layout for a remote.
    pub fn new(id: &RemoteId) -> Result<Self, GitFsError> {
        Ok(Self {
            base: id.cache_root().join("gitfs").join(slug(id)?),
        })
    }

    /// Returns the directory holding every generation.
    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Returns the directory of a generation.
    pub fn generation_dir(&self, generation: u64) -> PathBuf {
        self.base.join(generation.to_string())
    }

    /// Returns the staging directory a generation is cloned into.
    pub fn staging_dir(&self, generation: u64) -> PathBuf {
        self.base.join(format!("{}{}", STAGING_PREFIX, generation))
    }

    /// Lists generations present on disk, oldest first.
    pub fn generations(&self) -> io::Result<Vec<u64>> {
        let entries = match fs::read_dir(&self.base) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut generations = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            if let Some(generation) = entry.file_name().to_str().and_then(|n| n.parse().ok()) {
                generations.push(generation);
            }
        }

        generations.sort_unstable();
        Ok(generations)
    }

    /// Returns the number the next generation should use.
    pub fn next_generation(&self) -> io::Result<u64> {
        Ok(self.generations()?.last().map_or(1, |g| g + 1))
    }

    /// Removes staging directories and every generation except `keep`.
    pub fn remove_stale(&self, keep: Option<u64>) -> io::Result<()> {
        let entries = match fs::read_dir(&self.base) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e),
        };

        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };

            let stale = if name.starts_with(STAGING_PREFIX) {
                true
            } else {
                match name.parse::<u64>() {
                    Ok(generation) => Some(generation) != keep,
                    Err(_) => false,
                }
            };
            if !stale {
                continue;
            }

            debug!("Removing stale mirror directory {:?}", entry.path());
            if let Err(e) = fs::remove_dir_all(entry.path()) {
                warn!("Failed to remove {:?}: {}", entry.path(), e);
            }
        }
        Ok(())
    }
}
