use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::feed::event::EventRecord;

/// Process-wide holder of the current event snapshot.
///
/// The snapshot is the full ordered event sequence from the most recent
/// successful fetch, newest-first. `replace` swaps it wholesale with a
/// lock-free atomic store, so readers on any task always observe either
/// the old or the new snapshot, never a partial state. Written only by
/// the refresh scheduler; read by aggregation call sites at any time.
pub struct SnapshotStore {
    inner: ArcSwap<Vec<EventRecord>>,
}

impl SnapshotStore {
    /// Creates a store holding an empty snapshot.
    pub fn new() -> Self {
        Self {
            inner: ArcSwap::from_pointee(Vec::new()),
        }
    }

    /// Installs `events` as the current snapshot, discarding the prior one.
    ///
    /// Accepts any sequence, including empty. The previous snapshot is
    /// dropped once the last reader releases its handle.
    pub fn replace(&self, events: Vec<EventRecord>) {
        self.inner.store(Arc::new(events));
    }

    /// Returns a shared handle to the current snapshot.
    pub fn current(&self) -> Arc<Vec<EventRecord>> {
        self.inner.load_full()
    }

    /// Returns a clone of the newest `limit` records (snapshot order is
    /// newest-first, so this is the snapshot's leading prefix).
    pub fn recent(&self, limit: usize) -> Vec<EventRecord> {
        let snapshot = self.inner.load();
        let end = limit.min(snapshot.len());
        snapshot[..end].to_vec()
    }

    /// Number of events in the current snapshot.
    pub fn len(&self) -> usize {
        self.inner.load().len()
    }

    /// True when the current snapshot holds no events.
    pub fn is_empty(&self) -> bool {
        self.inner.load().is_empty()
    }
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}
