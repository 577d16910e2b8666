//! GitFS Core - Domain types for the remote cache
//!
//! This crate provides the configuration model shared by the Git cache
//! engine and the server: remote configuration and identity, provider
//! selection, ref patterns and repository-relative path handling.

pub mod error;
pub mod path;
pub mod pattern;
pub mod provider;
pub mod remote;

pub use error::{ConfigError, Result};
pub use path::{MountMap, normalize_path};
pub use pattern::{RefAllowlist, RefPattern};
pub use provider::Provider;
pub use remote::{RemoteConfig, RemoteConfigBuilder, RemoteId};

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
