//! Application state.

use std::sync::Arc;

use gitfs_git::{CacheRegistry, FileResolver, FileSource};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Where files come from.
    source: Arc<dyn FileSource>,
}

impl AppState {
    /// Creates a new AppState with the given file source.
    pub fn new(source: Arc<dyn FileSource>) -> Self {
        Self { source }
    }

    /// Creates an AppState serving a registry's caches.
    pub fn from_registry(registry: Arc<CacheRegistry>) -> Self {
        Self::new(Arc::new(FileResolver::new(registry)))
    }

    /// Returns the file source.
    pub fn source(&self) -> &dyn FileSource {
        self.source.as_ref()
    }
}
