//! Ranked eviction index.
//!
//! A `BTreeMap` keyed by [`RankKey`] holding the metadata of every live
//! entry; its first element is the next eviction victim. The index is
//! synchronized separately from the segment maps. Inserts and removals
//! happen inside the per-key compute of the owning segment, so for a given
//! key the two structures change together. A snapshot or victim taken from
//! the index may be stale by the time its key is computed; such metadata is
//! detected by identity and discarded by the eviction check or sweep.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::metadata::{EntryMetadata, RankKey};

pub(crate) struct RankedIndex<K> {
    ranks: Mutex<BTreeMap<RankKey, Arc<EntryMetadata<K>>>>,
    len: AtomicUsize,
}

impl<K> RankedIndex<K> {
    pub(crate) fn new() -> Self {
        Self { ranks: Mutex::new(BTreeMap::new()), len: AtomicUsize::new(0) }
    }

    /// Number of indexed entries; readable without the lock.
    pub(crate) fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    pub(crate) fn insert(&self, metadata: Arc<EntryMetadata<K>>) {
        let mut ranks = self.ranks.lock();
        if ranks.insert(metadata.rank(), metadata).is_none() {
            self.len.fetch_add(1, Ordering::AcqRel);
        }
    }

    /// Remove `metadata` if this exact instance is indexed.
    pub(crate) fn remove(&self, metadata: &Arc<EntryMetadata<K>>) -> bool {
        let mut ranks = self.ranks.lock();
        Self::remove_locked(&mut ranks, &self.len, metadata)
    }

    fn remove_locked(
        ranks: &mut BTreeMap<RankKey, Arc<EntryMetadata<K>>>,
        len: &AtomicUsize,
        metadata: &Arc<EntryMetadata<K>>,
    ) -> bool {
        let rank = metadata.rank();
        match ranks.get(&rank) {
            Some(indexed) if Arc::ptr_eq(indexed, metadata) => {
                ranks.remove(&rank);
                len.fetch_sub(1, Ordering::AcqRel);
                true
            }
            _ => false,
        }
    }

    /// Apply a read to `metadata`, re-ranking it if its policy depends on
    /// usage. Metadata that is no longer indexed is updated but not
    /// re-inserted.
    pub(crate) fn touch(&self, metadata: &Arc<EntryMetadata<K>>, now: i64, stamp: u64) {
        if !metadata.rank_follows_usage() {
            metadata.on_usage(now, stamp);
            return;
        }
        let mut ranks = self.ranks.lock();
        let indexed = Self::remove_locked(&mut ranks, &self.len, metadata);
        metadata.on_usage(now, stamp);
        if indexed {
            ranks.insert(metadata.rank(), Arc::clone(metadata));
            self.len.fetch_add(1, Ordering::AcqRel);
        }
    }

    /// Lowest-ranked metadata whose key is not `excluded`.
    pub(crate) fn first_excluding(&self, excluded: Option<&K>) -> Option<Arc<EntryMetadata<K>>>
    where
        K: Eq,
    {
        let ranks = self.ranks.lock();
        ranks.values().find(|m| excluded.map_or(true, |key| m.key() != key)).cloned()
    }

    /// Copy of the index in rank order.
    pub(crate) fn snapshot(&self) -> Vec<Arc<EntryMetadata<K>>> {
        self.ranks.lock().values().cloned().collect()
    }
}
