//! Key-space sharding over independent concurrent maps.

use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hash};
use std::sync::Arc;

use dashmap::DashMap;

use crate::config::MemoryStoreConfiguration;
use crate::entry::MemCacheEntry;

pub(crate) type Segment<K, V> = DashMap<K, Arc<MemCacheEntry<K, V>>>;

/// Number of segments for a store: the concurrency level rounded up to a
/// power of two, halved until each segment can hold at least two entries.
pub(crate) fn segment_count(max_entries: usize, concurrency_level: usize) -> usize {
    let mut count = concurrency_level.max(1).next_power_of_two();
    while count > 1 && max_entries / count < 2 {
        count >>= 1;
    }
    count
}

/// Folds the high half of the hash into the low bits used for masking.
const fn spread(hash: u64) -> u64 {
    hash ^ (hash >> 32)
}

pub(crate) struct Segments<K, V> {
    maps: Box<[Segment<K, V>]>,
    hasher: RandomState,
}

impl<K: Eq + Hash, V> Segments<K, V> {
    pub(crate) fn new(config: &MemoryStoreConfiguration) -> Self {
        let count = segment_count(config.max_entries(), config.concurrency_level());
        Self { maps: (0..count).map(|_| DashMap::new()).collect(), hasher: RandomState::new() }
    }

    pub(crate) fn count(&self) -> usize {
        self.maps.len()
    }

    fn index_of(&self, key: &K) -> usize {
        let mask = (self.maps.len() - 1) as u64;
        // The mask keeps the value below the segment count.
        #[allow(clippy::cast_possible_truncation)]
        let index = (spread(self.hasher.hash_one(key)) & mask) as usize;
        index
    }

    pub(crate) fn segment_for(&self, key: &K) -> &Segment<K, V> {
        &self.maps[self.index_of(key)]
    }

    /// Sum of segment sizes; not a snapshot under concurrent writes.
    pub(crate) fn len(&self) -> usize {
        self.maps.iter().map(DashMap::len).sum()
    }

    /// Remove every entry, handing each removed entry to `on_removed` while
    /// its segment is still locked.
    pub(crate) fn clear(&self, mut on_removed: impl FnMut(&MemCacheEntry<K, V>)) {
        for map in self.maps.iter() {
            map.retain(|_, entry| {
                on_removed(entry);
                false
            });
        }
    }

    pub(crate) fn view(&self) -> EntriesView<'_, K, V> {
        EntriesView { segments: &self.maps }
    }
}

/// Live, uncopied view over every segment of a store
pub struct EntriesView<'a, K, V> {
    segments: &'a [Segment<K, V>],
}

impl<'a, K: Eq + Hash, V> EntriesView<'a, K, V> {
    /// Entries currently stored
    pub fn len(&self) -> usize {
        self.segments.iter().map(DashMap::len).sum()
    }

    /// Whether no entries are stored
    pub fn is_empty(&self) -> bool {
        self.segments.iter().all(DashMap::is_empty)
    }

    /// Iterate segment by segment
    pub fn iter(&self) -> impl Iterator<Item = Arc<MemCacheEntry<K, V>>> + 'a {
        self.segments.iter().flat_map(|map| map.iter().map(|item| Arc::clone(item.value())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Validates segment sizing.
    ///
    /// Assertions:
    /// - Levels round up to a power of two.
    /// - Small capacities shrink the count so each segment holds two entries.
    #[test]
    fn test_segment_count() {
        assert_eq!(segment_count(1_000, 16), 16);
        assert_eq!(segment_count(1_000, 10), 16);
        assert_eq!(segment_count(8, 8), 4);
        assert_eq!(segment_count(3, 3), 1);
        assert_eq!(segment_count(1, 1), 1);
    }

    /// Validates that a key always maps to the same segment.
    #[test]
    fn test_segment_for_is_stable() {
        let config = MemoryStoreConfiguration::builder()
            .max_entries(1_024)
            .concurrency_level(8)
            .build()
            .unwrap();
        let segments: Segments<String, u32> = Segments::new(&config);
        assert_eq!(segments.count(), 8);

        let key = "stable".to_string();
        let first = std::ptr::from_ref(segments.segment_for(&key));
        for _ in 0..10 {
            assert!(std::ptr::eq(first, segments.segment_for(&key)));
        }
        assert_eq!(segments.len(), 0);
        assert!(segments.view().is_empty());
    }
}
