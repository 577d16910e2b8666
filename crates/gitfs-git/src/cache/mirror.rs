//! Snapshot slot and fetch lock of one mirror.

use std::sync::{Arc, Weak};
use std::time::Instant;

use gitfs_core::RemoteId;
use parking_lot::RwLock;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use super::layout::MirrorLayout;
use crate::error::GitFsError;
use crate::provider::RepoHandle;
use crate::refs::RefEntry;
use crate::sync::CacheState;

/// A fully fetched view of a mirror.
///
/// Readers hold an `Arc<Snapshot>` for the duration of a lookup; refs in a
/// snapshot never change, and blobs are read by commit id.
#[derive(Debug)]
pub struct Snapshot {
    handle: Arc<RepoHandle>,
    refs: Vec<RefEntry>,
    fetched_at: Instant,
    generation: u64,
}

impl Snapshot {
    /// Creates a snapshot of `handle` with the given refs.
    pub fn new(handle: Arc<RepoHandle>, refs: Vec<RefEntry>, generation: u64) -> Self {
        Self {
            handle,
            refs,
            fetched_at: Instant::now(),
            generation,
        }
    }

    /// Returns the mirror handle.
    pub fn handle(&self) -> &Arc<RepoHandle> {
        &self.handle
    }

    /// Returns the refs, sorted by full name.
    pub fn refs(&self) -> &[RefEntry] {
        &self.refs
    }

    /// Returns when the snapshot was taken.
    pub fn fetched_at(&self) -> Instant {
        self.fetched_at
    }

    /// Returns the mirror generation.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Mutable state of one remote's mirror.
///
/// Shared between successive `RemoteCache` instances of the same identity,
/// so a configuration reload keeps the fetched data and the fetch lock.
#[derive(Debug)]
pub struct Mirror {
    id: RemoteId,
    layout: MirrorLayout,
    snapshot: RwLock<Option<Arc<Snapshot>>>,
    retired: parking_lot::Mutex<Weak<Snapshot>>,
    fetch_lock: Arc<Mutex<()>>,
    state: CacheState,
}

impl Mirror {
    /// Creates an empty mirror for a remote.
    pub fn new(id: RemoteId) -> Result<Self, GitFsError> {
        Ok(Self {
            layout: MirrorLayout::new(&id)?,
            id,
            snapshot: RwLock::new(None),
            retired: parking_lot::Mutex::new(Weak::new()),
            fetch_lock: Arc::new(Mutex::new(())),
            state: CacheState::new(),
        })
    }

    /// Returns the remote identity.
    pub fn id(&self) -> &RemoteId {
        &self.id
    }

    /// Returns the on-disk layout.
    pub fn layout(&self) -> &MirrorLayout {
        &self.layout
    }

    /// Returns the fetch state.
    pub fn state(&self) -> &CacheState {
        &self.state
    }

    /// Returns the current snapshot.
    pub fn current(&self) -> Option<Arc<Snapshot>> {
        self.snapshot.read().clone()
    }

    /// Installs a new snapshot, returning the previous one.
    pub fn install(&self, snapshot: Snapshot) -> Option<Arc<Snapshot>> {
        let generation = snapshot.generation;
        let previous = self.snapshot.write().replace(Arc::new(snapshot));

        if let Some(old) = &previous {
            debug!(
                "Replaced snapshot of {} (generation {} -> {})",
                self.id,
                old.generation(),
                generation
            );
        }
        previous
    }

    /// Acquires the fetch lock.
    ///
    /// The guard is owned so it can move into a blocking task and stay held
    /// until that task finishes, even if the caller stops waiting.
    pub async fn lock(&self) -> OwnedMutexGuard<()> {
        Arc::clone(&self.fetch_lock).lock_owned().await
    }

    /// Drops the current snapshot and marks its directory for deletion.
    ///
    /// The directory is removed once in-flight readers release the snapshot.
    pub fn retire(&self) {
        if let Some(snapshot) = self.snapshot.write().take() {
            debug!("Retiring mirror {:?}", snapshot.handle().git_dir());
            snapshot.handle().retire();
            *self.retired.lock() = Arc::downgrade(&snapshot);
        }
    }

    /// Returns true while readers still hold the retired snapshot.
    pub fn is_draining(&self) -> bool {
        self.retired.lock().strong_count() > 0
    }

    /// Reinstalls the retired snapshot if a reader still holds it.
    ///
    /// Returns false once the snapshot is gone; its directory is deleted
    /// or being deleted then, and the mirror must not be reused.
    pub fn revive(&self) -> bool {
        let Some(snapshot) = std::mem::take(&mut *self.retired.lock()).upgrade() else {
            return false;
        };
        debug!("Reviving mirror {:?}", snapshot.handle().git_dir());
        snapshot.handle().reinstate();
        *self.snapshot.write() = Some(snapshot);
        true
    }
}
