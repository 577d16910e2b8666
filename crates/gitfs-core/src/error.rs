//! Error types for configuration validation.
//!
//! Everything in this crate is validated before a remote reaches the cache
//! engine, so the only failures here are configuration mistakes.
//!
//! # Example
//!
//! ```
//! use gitfs_core::{ConfigError, RemoteConfig};
//!
//! let err = RemoteConfig::builder().cache_root("/var/cache/gitfs").build();
//! assert!(matches!(err, Err(ConfigError::MissingField("url"))));
//! ```

use thiserror::Error;

/// Result alias for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors produced while building or validating remote configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A required field was not provided.
    #[error("missing required field '{0}'")]
    MissingField(&'static str),

    /// A field was provided but its value is unusable.
    #[error("invalid value for '{field}': {reason}")]
    InvalidField {
        /// The offending field
        field: &'static str,
        /// Why it was rejected
        reason: String,
    },

    /// A ref pattern could not be compiled.
    #[error("invalid ref pattern '{pattern}': {reason}")]
    InvalidPattern {
        /// The raw pattern text
        pattern: String,
        /// Compiler message
        reason: String,
    },

    /// The provider name is not one of the supported bindings.
    #[error("unknown provider '{0}' (expected 'gix' or 'git2')")]
    UnknownProvider(String),
}

impl ConfigError {
    /// Creates an invalid field error.
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field,
            reason: reason.into(),
        }
    }
}
