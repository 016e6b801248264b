//! Read and write operations with their async twins.

use std::sync::Arc;

use super::{Computed, MemCache, Remap};
use crate::async_ops::AsyncResult;
use crate::entry::{CacheKey, CacheValue, MemCacheEntry};
use crate::events::EventType;

impl<K: CacheKey, V: CacheValue> MemCache<K, V> {
    /// Value mapped to `key`, recording a read hit or miss.
    pub fn get(&self, key: &K) -> Option<V> {
        let found = self.inner.segments.segment_for(key).get(key).map(|e| Arc::clone(e.value()));
        let stats = &self.inner.statistics;
        match found {
            Some(entry) => {
                self.touch(&entry);
                stats.record_read_hit();
                Some(entry.value().clone())
            }
            None => {
                stats.record_read_miss();
                None
            }
        }
    }

    /// Map `key` to `value`, returning the previous value.
    pub fn put(&self, key: K, value: V) -> Option<V> {
        let computed = self.compute_entry(&key, EventType::Removed, |_, _| Remap::Set(value));
        self.inner.statistics.record_put_hit();
        self.after_write(&key, &computed);
        computed.previous_value()
    }

    /// Map `key` to `value` unless a mapping exists.
    ///
    /// Returns the existing value, or `None` if `value` was stored.
    pub fn put_if_absent(&self, key: K, value: V) -> Option<V> {
        let computed = self.compute_entry(&key, EventType::Removed, |_, current| match current {
            Some(_) => Remap::Keep,
            None => Remap::Set(value),
        });
        if computed.inserted() {
            self.inner.statistics.record_put_hit();
            self.after_write(&key, &computed);
            None
        } else {
            self.inner.statistics.record_put_miss();
            computed.previous_value()
        }
    }

    /// Remove the mapping for `key`, returning the removed value.
    pub fn remove(&self, key: &K) -> Option<V> {
        let computed = self.compute_entry(key, EventType::Removed, |_, current| match current {
            Some(_) => Remap::Delete,
            None => Remap::Keep,
        });
        if computed.removed() {
            self.inner.statistics.record_removal_hit();
        } else {
            self.inner.statistics.record_removal_miss();
        }
        computed.previous_value()
    }

    /// Remove the mapping for `key` only if it currently maps to `value`.
    pub fn remove_value(&self, key: &K, value: &V) -> bool {
        self.replace(key.clone(), Some(value), None)
    }

    /// Conditionally replace the mapping for `key`.
    ///
    /// Applies only when the current value equals `expected` (`None` meaning
    /// "no mapping"). `new_value` of `None` removes the mapping. Returns
    /// `false` and leaves the cache untouched when the condition does not
    /// hold.
    pub fn replace(&self, key: K, expected: Option<&V>, new_value: Option<V>) -> bool {
        let installs = new_value.is_some();
        let mut matched = false;
        let computed = self.compute_entry(&key, EventType::Removed, |_, current| {
            if current.map(|entry| entry.value()) != expected {
                return Remap::Keep;
            }
            matched = true;
            new_value.map_or(Remap::Delete, Remap::Set)
        });

        let stats = &self.inner.statistics;
        if !matched {
            if installs {
                stats.record_put_miss();
            } else {
                stats.record_removal_miss();
            }
            return false;
        }

        if computed.removed() {
            stats.record_removal_hit();
        } else if installs {
            stats.record_put_hit();
        }
        self.after_write(&key, &computed);
        installs || computed.changed()
    }

    /// Combine `value` with the current mapping.
    ///
    /// Absent keys are mapped to `value`. Otherwise `merge(current, value)`
    /// becomes the new value, or removes the mapping when it returns `None`.
    /// Returns the resulting value.
    pub fn merge<F>(&self, key: K, value: V, merge: F) -> Option<V>
    where
        F: FnOnce(&V, &V) -> Option<V>,
    {
        let computed = self.compute_entry(&key, EventType::Removed, |_, current| match current {
            None => Remap::Set(value),
            Some(existing) => merge(existing.value(), &value).map_or(Remap::Delete, Remap::Set),
        });

        let stats = &self.inner.statistics;
        if computed.removed() {
            stats.record_removal_hit();
        } else if computed.changed() {
            stats.record_put_hit();
        } else {
            stats.record_put_miss();
        }
        self.after_write(&key, &computed);
        computed.current_value()
    }

    /// Return the current value, computing and storing one when absent.
    ///
    /// Nothing is stored when `compute` returns `None`.
    pub fn compute_if_absent<F>(&self, key: K, compute: F) -> Option<V>
    where
        F: FnOnce(&K) -> Option<V>,
    {
        let computed = self.compute_entry(&key, EventType::Removed, |k, current| match current {
            Some(_) => Remap::Keep,
            None => compute(k).map_or(Remap::Keep, Remap::Set),
        });

        if computed.inserted() {
            self.inner.statistics.record_put_hit();
            self.after_write(&key, &computed);
        } else if let Some(existing) = &computed.current {
            self.touch(existing);
            self.inner.statistics.record_read_hit();
        }
        computed.current_value()
    }

    /// Remap `key` from its current value (if any) to the value returned by
    /// `remap`; `None` removes the mapping. Returns the resulting value.
    pub fn compute<F>(&self, key: K, remap: F) -> Option<V>
    where
        F: FnOnce(&K, Option<&V>) -> Option<V>,
    {
        let computed = self.compute_entry(&key, EventType::Removed, |k, current| {
            remap(k, current.map(|entry| entry.value())).map_or(Remap::Delete, Remap::Set)
        });

        if computed.removed() {
            self.inner.statistics.record_removal_hit();
        } else if computed.changed() {
            self.inner.statistics.record_put_hit();
        }
        self.after_write(&key, &computed);
        computed.current_value()
    }

    /// Like [`compute`](Self::compute) but only for existing mappings.
    pub fn compute_if_present<F>(&self, key: &K, remap: F) -> Option<V>
    where
        F: FnOnce(&K, &V) -> Option<V>,
    {
        let computed = self.compute_entry(key, EventType::Removed, |k, current| match current {
            Some(existing) => remap(k, existing.value()).map_or(Remap::Delete, Remap::Set),
            None => Remap::Keep,
        });

        if computed.removed() {
            self.inner.statistics.record_removal_hit();
        } else if computed.changed() {
            self.inner.statistics.record_put_hit();
        }
        computed.current_value()
    }

    pub fn get_async(&self, key: K) -> AsyncResult<Option<V>> {
        let cache = self.clone();
        self.inner.invoker.invoke(move || cache.get(&key))
    }

    pub fn put_async(&self, key: K, value: V) -> AsyncResult<Option<V>> {
        let cache = self.clone();
        self.inner.invoker.invoke(move || cache.put(key, value))
    }

    pub fn put_if_absent_async(&self, key: K, value: V) -> AsyncResult<Option<V>> {
        let cache = self.clone();
        self.inner.invoker.invoke(move || cache.put_if_absent(key, value))
    }

    pub fn remove_async(&self, key: K) -> AsyncResult<Option<V>> {
        let cache = self.clone();
        self.inner.invoker.invoke(move || cache.remove(&key))
    }

    pub fn remove_value_async(&self, key: K, value: V) -> AsyncResult<bool> {
        let cache = self.clone();
        self.inner.invoker.invoke(move || cache.remove_value(&key, &value))
    }

    pub fn replace_async(&self, key: K, expected: Option<V>, new_value: Option<V>) -> AsyncResult<bool> {
        let cache = self.clone();
        self.inner.invoker.invoke(move || cache.replace(key, expected.as_ref(), new_value))
    }

    pub fn merge_async<F>(&self, key: K, value: V, merge: F) -> AsyncResult<Option<V>>
    where
        F: FnOnce(&V, &V) -> Option<V> + Send + 'static,
    {
        let cache = self.clone();
        self.inner.invoker.invoke(move || cache.merge(key, value, merge))
    }

    pub fn compute_if_absent_async<F>(&self, key: K, compute: F) -> AsyncResult<Option<V>>
    where
        F: FnOnce(&K) -> Option<V> + Send + 'static,
    {
        let cache = self.clone();
        self.inner.invoker.invoke(move || cache.compute_if_absent(key, compute))
    }

    pub fn compute_async<F>(&self, key: K, remap: F) -> AsyncResult<Option<V>>
    where
        F: FnOnce(&K, Option<&V>) -> Option<V> + Send + 'static,
    {
        let cache = self.clone();
        self.inner.invoker.invoke(move || cache.compute(key, remap))
    }

    pub fn compute_if_present_async<F>(&self, key: K, remap: F) -> AsyncResult<Option<V>>
    where
        F: FnOnce(&K, &V) -> Option<V> + Send + 'static,
    {
        let cache = self.clone();
        self.inner.invoker.invoke(move || cache.compute_if_present(&key, remap))
    }

    pub fn clear_async(&self) -> AsyncResult<()> {
        let cache = self.clone();
        self.inner.invoker.run(move || cache.clear())
    }

    fn touch(&self, entry: &MemCacheEntry<K, V>) {
        let factory = &self.inner.factory;
        self.inner.index.touch(entry.metadata(), factory.now(), factory.next_stamp());
    }

    fn after_write(&self, key: &K, computed: &Computed<K, V>) {
        if computed.inserted() {
            self.enforce_capacity(Some(key));
        }
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;

    use super::*;
    use crate::config::EvictionPolicy;
    use crate::events::{
        CacheEntriesEvent, CacheEntryEvent, CacheEntryEventListener, ListenerRef,
    };
    use crate::store::test_support::eternal_cache;

    type Seen = (EventType, u32, Option<String>, Option<String>);

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<Seen>>,
        batches: Mutex<Vec<EventType>>,
    }

    impl CacheEntryEventListener<u32, String> for Recorder {
        fn on_event(&self, event: &CacheEntryEvent<u32, String>) {
            assert_eq!(event.cache_name(), "test");
            self.events.lock().push((
                event.event_type(),
                *event.key(),
                event.old_value().cloned(),
                event.new_value().cloned(),
            ));
        }

        fn on_batch_event(&self, event: &CacheEntriesEvent) {
            self.batches.lock().push(event.event_type());
        }
    }

    fn s(value: &str) -> Option<String> {
        Some(value.to_string())
    }

    /// Validates event completeness and ordering for put/put/remove/clear.
    ///
    /// # Test Steps
    /// 1. Register a recording listener
    /// 2. put(1,"a"), put(1,"b"), put(1,"b") again, remove(1), put(2,"c"), clear()
    /// 3. Verify ADDED, UPDATED, REMOVED, ADDED and a single REMOVED batch
    #[test]
    fn test_event_sequence() {
        let cache = eternal_cache(EvictionPolicy::Lru, 10);
        let recorder = Arc::new(Recorder::default());
        cache.register_event_listener(Arc::clone(&recorder) as ListenerRef<u32, String>).unwrap();

        assert_eq!(cache.put(1, "a".into()), None);
        assert_eq!(cache.put(1, "b".into()), s("a"));
        assert_eq!(cache.put(1, "b".into()), s("b"));
        assert_eq!(cache.remove(&1), s("b"));
        cache.put(2, "c".into());
        cache.clear();

        assert_eq!(
            *recorder.events.lock(),
            vec![
                (EventType::Added, 1, None, s("a")),
                (EventType::Updated, 1, s("a"), s("b")),
                (EventType::Removed, 1, s("b"), None),
                (EventType::Added, 2, None, s("c")),
            ]
        );
        assert_eq!(*recorder.batches.lock(), vec![EventType::Removed]);
        assert!(cache.is_empty());
    }

    /// Validates statistics accounting for a basic read/write sequence.
    ///
    /// Assertions:
    /// - put, hit, miss and removal are each counted once.
    /// - Approximate totals sum the hit and miss categories.
    #[test]
    fn test_statistics_accounting() {
        let cache = eternal_cache(EvictionPolicy::Lfu, 10);
        cache.put(1, "a".into());
        assert_eq!(cache.get(&1), s("a"));
        assert_eq!(cache.get(&2), None);
        cache.remove(&1);

        let stats = cache.statistics();
        assert_eq!(stats.put_hits(), 1);
        assert_eq!(stats.read_only_retrieval_hits(), 1);
        assert_eq!(stats.read_only_retrieval_misses(), 1);
        assert_eq!(stats.removal_hits(), 1);
        assert_eq!(stats.approximate_hits_count(), 3);
        assert_eq!(stats.approximate_misses_count(), 1);
        assert_eq!(stats.current_entries_count(), 0);
    }

    /// Validates conditional replace and remove_value.
    #[test]
    fn test_replace_semantics() {
        let cache = eternal_cache(EvictionPolicy::Fifo, 10);
        cache.put(1, "a".into());

        assert!(!cache.replace(1, Some(&"x".to_string()), s("b")));
        assert_eq!(cache.get(&1), s("a"));
        assert_eq!(cache.statistics().put_misses(), 1);

        assert!(cache.replace(1, Some(&"a".to_string()), s("b")));
        assert_eq!(cache.get(&1), s("b"));

        assert!(cache.replace(2, None, s("new")));
        assert_eq!(cache.get(&2), s("new"));
        assert!(!cache.replace(3, None, None));

        assert!(!cache.remove_value(&1, &"a".to_string()));
        assert_eq!(cache.statistics().removal_misses(), 1);
        assert!(cache.remove_value(&1, &"b".to_string()));
        assert_eq!(cache.get(&1), None);
    }

    /// Validates put_if_absent return values and counters.
    #[test]
    fn test_put_if_absent() {
        let cache = eternal_cache(EvictionPolicy::Lru, 10);
        assert_eq!(cache.put_if_absent(1, "a".into()), None);
        assert_eq!(cache.put_if_absent(1, "b".into()), s("a"));
        assert_eq!(cache.get(&1), s("a"));
        assert_eq!(cache.statistics().put_hits(), 1);
        assert_eq!(cache.statistics().put_misses(), 1);
    }

    /// Validates merge for absent, changed, unchanged and removed outcomes.
    #[test]
    fn test_merge() {
        let cache = eternal_cache(EvictionPolicy::Lru, 10);
        let concat = |old: &String, new: &String| Some(format!("{old}{new}"));

        assert_eq!(cache.merge(1, "a".into(), concat), s("a"));
        assert_eq!(cache.merge(1, "b".into(), concat), s("ab"));
        assert_eq!(cache.merge(1, "x".into(), |old, _| Some(old.clone())), s("ab"));
        assert_eq!(cache.merge(1, "x".into(), |_, _| None), None);

        let stats = cache.statistics();
        assert_eq!(stats.put_hits(), 2);
        assert_eq!(stats.put_misses(), 1);
        assert_eq!(stats.removal_hits(), 1);
        assert!(cache.is_empty());
    }

    /// Validates the compute family.
    ///
    /// # Test Steps
    /// 1. compute_if_absent stores a value once and later reads it back
    /// 2. compute_if_present on a missing key does nothing
    /// 3. compute updates and then removes the mapping
    #[test]
    fn test_compute_operations() {
        let cache = eternal_cache(EvictionPolicy::Mru, 10);

        assert_eq!(cache.compute_if_absent(1, |k| Some(format!("v{k}"))), s("v1"));
        assert_eq!(cache.compute_if_absent(1, |_| Some("ignored".into())), s("v1"));
        assert_eq!(cache.compute_if_absent(2, |_| None), None);
        assert_eq!(cache.statistics().read_only_retrieval_hits(), 1);

        assert_eq!(cache.compute_if_present(&2, |_, v| Some(v.clone())), None);
        assert_eq!(cache.compute_if_present(&1, |_, v| Some(format!("{v}!"))), s("v1!"));

        assert_eq!(cache.compute(3, |_, old| Some(format!("{old:?}"))), s("None"));
        assert_eq!(cache.compute(3, |_, _| None), None);
        assert_eq!(cache.compute(4, |_, _| None), None);

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.statistics().removal_hits(), 1);
    }

    /// Validates the async twins against the synchronous results.
    #[tokio::test]
    async fn test_async_operations() {
        let cache = eternal_cache(EvictionPolicy::Lru, 10);

        assert_eq!(cache.put_async(1, "a".into()).await.unwrap(), None);
        assert_eq!(cache.get_async(1).await.unwrap(), s("a"));
        assert_eq!(cache.put_if_absent_async(1, "z".into()).await.unwrap(), s("a"));
        assert!(cache.replace_async(1, s("a"), s("b")).await.unwrap());
        assert_eq!(
            cache.merge_async(1, "c".into(), |o, n| Some(format!("{o}{n}"))).await.unwrap(),
            s("bc")
        );
        assert_eq!(cache.compute_if_absent_async(2, |_| s("two")).await.unwrap(), s("two"));
        assert_eq!(
            cache.compute_if_present_async(2, |_, v| Some(v.to_uppercase())).await.unwrap(),
            s("TWO")
        );
        assert_eq!(cache.compute_async(3, |_, _| s("three")).await.unwrap(), s("three"));
        assert!(cache.remove_value_async(3, "three".into()).await.unwrap());
        assert_eq!(cache.remove_async(2).await.unwrap(), s("TWO"));

        cache.clear_async().await.unwrap();
        assert!(cache.is_empty());
    }

    /// Validates that a panicking async operation surfaces as an error.
    #[tokio::test]
    async fn test_async_panic_propagates() {
        let cache = eternal_cache(EvictionPolicy::Lru, 10);
        cache.put(1, "a".into());

        let result = cache.compute_async(1, |_, _| -> Option<String> { panic!("boom") }).await;
        assert!(result.is_err());
        assert_eq!(cache.get(&1), s("a"));
    }
}
