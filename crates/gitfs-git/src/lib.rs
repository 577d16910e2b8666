//! # GitFS Git Cache
//!
//! Remote-repository-backed file cache for GitFS.
//!
//! Each configured remote is kept as a local bare mirror. Files are read
//! straight from the object database at the commit a ref points to, so no
//! worktree is ever checked out.
//!
//! ## Features
//!
//! - Two interchangeable Git providers: `gix` (pure Rust) and `git2` (libgit2)
//! - One cache per (url, cache root), shared across duplicate configuration
//! - Snapshot reads: lookups never observe a half-finished fetch
//! - Glob environments resolving to the most recent matching ref
//! - Background refresh with per-remote backoff
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use gitfs_core::RemoteConfig;
//! use gitfs_git::{CacheRegistry, FileResolver};
//!
//! let remote = RemoteConfig::builder()
//!     .url("https://github.com/org/salt-states.git")
//!     .cache_root("/var/cache/gitfs")
//!     .build()?;
//!
//! let registry = Arc::new(CacheRegistry::new());
//! registry.load(vec![remote]).await?;
//!
//! let resolver = FileResolver::new(registry);
//! let resolution = resolver.resolve("base", "top.sls").await;
//! ```

pub mod cache;
pub mod error;
pub mod provider;
pub mod refs;
pub mod registry;
pub mod resolver;
pub mod source;
pub mod sync;

// Re-exports
pub use cache::{CacheHealth, CachedFile, RemoteCache, Snapshot};
pub use error::GitFsError;
pub use provider::{FetchResult, Git2Binding, GixBinding, ProviderBinding, RepoHandle, binding_for};
pub use refs::{RefEntry, RefKind, Selection, select_newest};
pub use registry::{
    BindingSelector, CacheRegistry, DisabledRemote, LoadReport, RefreshReport, RefreshedRemote,
    RemoteFailure,
};
pub use resolver::{FileResolver, Resolution, ResolvedFile};
pub use source::FileSource;
pub use sync::{CacheState, RefreshConfig, RefreshHandle, RefreshScheduler, ReportObserver};

// Re-export gitfs_core for consumers
pub use gitfs_core;
