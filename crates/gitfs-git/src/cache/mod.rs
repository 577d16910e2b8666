//! Remote caches: one bare mirror per (url, cache root).

mod layout;
mod mirror;
mod remote;

pub use layout::{MirrorLayout, slug};
pub use mirror::{Mirror, Snapshot};
pub use remote::{CacheHealth, CachedFile, RemoteCache};
