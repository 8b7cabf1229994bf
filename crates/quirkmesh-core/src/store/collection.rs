// ── Generic reactive collection ──
//
// Concurrent keyed storage with push-based change notification via
// `watch` channels.

use std::hash::Hash;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::watch;

/// A concurrent, reactive collection of one record type.
///
/// `DashMap` gives per-shard locking for writers from many device
/// workers; every mutation bumps a version counter and republishes the
/// full snapshot to subscribers. Keys are typed, never concatenated
/// strings, so two owners can never alias each other's records.
pub(crate) struct Collection<K, T>
where
    K: Eq + Hash + Ord + Clone,
    T: Send + Sync + 'static,
{
    by_key: DashMap<K, Arc<T>>,

    /// Version counter, bumped on every mutation.
    version: watch::Sender<u64>,

    /// Full snapshot, sorted by key, rebuilt on mutation.
    snapshot: watch::Sender<Arc<Vec<Arc<T>>>>,
}

impl<K, T> Collection<K, T>
where
    K: Eq + Hash + Ord + Clone,
    T: Send + Sync + 'static,
{
    pub(crate) fn new() -> Self {
        let (version, _) = watch::channel(0u64);
        let (snapshot, _) = watch::channel(Arc::new(Vec::new()));

        Self {
            by_key: DashMap::new(),
            version,
            snapshot,
        }
    }

    /// Insert or replace a record. Returns `true` if the key was new.
    pub(crate) fn upsert(&self, key: K, record: T) -> bool {
        let is_new = self.by_key.insert(key, Arc::new(record)).is_none();
        self.publish();
        is_new
    }

    /// Replace a record in place through `f`, if present.
    pub(crate) fn update<F>(&self, key: &K, f: F) -> bool
    where
        F: FnOnce(&T) -> T,
    {
        let updated = match self.by_key.get_mut(key) {
            Some(mut entry) => {
                let next = f(entry.value());
                *entry.value_mut() = Arc::new(next);
                true
            }
            None => false,
        };
        if updated {
            self.publish();
        }
        updated
    }

    pub(crate) fn remove(&self, key: &K) -> Option<Arc<T>> {
        let removed = self.by_key.remove(key).map(|(_, v)| v);
        if removed.is_some() {
            self.publish();
        }
        removed
    }

    /// Remove every record whose key matches `pred`. Publishes once.
    pub(crate) fn remove_where<P>(&self, mut pred: P) -> usize
    where
        P: FnMut(&K) -> bool,
    {
        let before = self.by_key.len();
        self.by_key.retain(|k, _| !pred(k));
        let removed = before - self.by_key.len();
        if removed > 0 {
            self.publish();
        }
        removed
    }

    pub(crate) fn get(&self, key: &K) -> Option<Arc<T>> {
        self.by_key.get(key).map(|r| Arc::clone(r.value()))
    }

    /// Current snapshot (cheap `Arc` clone).
    pub(crate) fn snapshot(&self) -> Arc<Vec<Arc<T>>> {
        self.snapshot.borrow().clone()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<Arc<Vec<Arc<T>>>> {
        self.snapshot.subscribe()
    }

    pub(crate) fn version(&self) -> u64 {
        *self.version.borrow()
    }

    pub(crate) fn len(&self) -> usize {
        self.by_key.len()
    }

    // ── Private helpers ──────────────────────────────────────────────

    fn publish(&self) {
        let mut entries: Vec<(K, Arc<T>)> = self
            .by_key
            .iter()
            .map(|r| (r.key().clone(), Arc::clone(r.value())))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        let values = entries.into_iter().map(|(_, v)| v).collect();
        // `send_modify` updates unconditionally, even with zero receivers.
        self.snapshot.send_modify(|snap| *snap = Arc::new(values));
        self.version.send_modify(|v| *v += 1);
    }
}
