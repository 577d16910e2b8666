//! File source trait definition.

use async_trait::async_trait;

use crate::cache::CacheHealth;
use crate::registry::RefreshReport;
use crate::resolver::Resolution;

/// A source of files addressed by environment and path.
///
/// The server depends only on this trait, so it can be backed by a
/// [`FileResolver`](crate::FileResolver) or by a test double.
///
/// # Example
///
/// ```ignore
/// use gitfs_git::{FileSource, RefreshReport, Resolution};
///
/// struct Empty;
///
/// #[async_trait]
/// impl FileSource for Empty {
///     async fn resolve(&self, _env: &str, _path: &str) -> Resolution {
///         Resolution::default()
///     }
///
///     async fn envs(&self) -> Vec<String> {
///         Vec::new()
///     }
///
///     async fn refresh(&self) -> RefreshReport {
///         RefreshReport::default()
///     }
///
///     fn name(&self) -> &str {
///         "empty"
///     }
/// }
/// ```
#[async_trait]
pub trait FileSource: Send + Sync {
    /// Resolves `path` in environment `env`.
    ///
    /// Never fails: per-remote failures are reported in the resolution.
    async fn resolve(&self, env: &str, path: &str) -> Resolution;

    /// Lists the environments that can be served.
    async fn envs(&self) -> Vec<String>;

    /// Fetches every remote now.
    async fn refresh(&self) -> RefreshReport;

    /// Returns per-remote health.
    ///
    /// The default implementation reports nothing.
    async fn health(&self) -> Vec<CacheHealth> {
        Vec::new()
    }

    /// Returns the name of this source, for logging.
    fn name(&self) -> &str;
}
