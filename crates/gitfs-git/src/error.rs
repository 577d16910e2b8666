//! Error types for the Git cache.

use std::path::PathBuf;

use gitfs_core::ConfigError;

/// Errors that can occur while maintaining or reading a mirror.
#[derive(Debug, thiserror::Error)]
pub enum GitFsError {
    /// The remote could not be reached (network, auth, transport).
    #[error("remote unreachable: {url}: {reason}")]
    RemoteUnreachable { url: String, reason: String },

    /// The local mirror is damaged and must be re-cloned.
    #[error("repository corrupt at {path}: {reason}")]
    RepositoryCorrupt { path: PathBuf, reason: String },

    /// The remote is not a usable repository (configuration error).
    #[error("invalid repository {url}: {reason}")]
    InvalidRepository { url: String, reason: String },

    /// Several refs matched a pattern and no ordering separated them.
    #[error("ref pattern '{pattern}' is ambiguous: chose {chosen} over {}", candidates.join(", "))]
    RefAmbiguous {
        pattern: String,
        chosen: String,
        candidates: Vec<String>,
    },

    /// The cache has no mirror yet.
    #[error("remote {url} has not been cloned yet")]
    NotReady { url: String },

    /// A clone or fetch exceeded its deadline.
    #[error("operation timed out after {seconds}s")]
    Timeout { seconds: u64 },

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigError),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A blocking task panicked or was cancelled.
    #[error("task failed: {0}")]
    Task(String),
}

impl GitFsError {
    /// Creates a remote unreachable error.
    pub fn unreachable(url: impl Into<String>, reason: impl ToString) -> Self {
        Self::RemoteUnreachable {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    /// Creates a repository corrupt error.
    pub fn corrupt(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::RepositoryCorrupt {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Creates an invalid repository error.
    pub fn invalid_repository(url: impl Into<String>, reason: impl ToString) -> Self {
        Self::InvalidRepository {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    /// Returns true if this is a transient error that might succeed on retry.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RemoteUnreachable { .. } | Self::Timeout { .. } | Self::NotReady { .. }
        )
    }

    /// Returns true if the mirror must be discarded and cloned again.
    pub fn requires_reclone(&self) -> bool {
        matches!(self, Self::RepositoryCorrupt { .. })
    }

    /// Returns true if the error disables the cache until its configuration changes.
    pub fn is_configuration_error(&self) -> bool {
        matches!(self, Self::InvalidRepository { .. } | Self::InvalidConfig(_))
    }
}

impl From<tokio::task::JoinError> for GitFsError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::Task(e.to_string())
    }
}
