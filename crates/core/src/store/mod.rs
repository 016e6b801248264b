//! Segmented cache store
//!
//! - **[`segments`]**: key-space sharding over independent concurrent maps
//! - **`operations`**: the synchronous and async CRUD surface
//! - **`maintenance`**: capacity eviction, expiration sweeps and `clear`
//!
//! Every write goes through [`MemCache::compute_entry`], an atomic per-key
//! step on the owning segment. The ranked index is updated inside that step,
//! events fire after the segment lock is released, statistics are recorded by
//! the calling operation and inserts finish with a capacity check.

mod maintenance;
mod operations;
pub mod segments;

use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::AtomicI64;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use memcache_common::lifecycle::{ComponentStatus, Lifecycle, StatusCell};
use memcache_common::time::Clock;
use parking_lot::Mutex;
use tracing::{debug, error, info, instrument};

pub use segments::EntriesView;
pub(crate) use segments::Segments;

use crate::async_ops::AsyncOpsInvoker;
use crate::config::{CacheConfiguration, ExpirationConfiguration};
use crate::entry::{CacheKey, CacheValue, MemCacheEntry};
use crate::error::{CacheError, CacheResult};
use crate::events::{CacheEntryEvent, EventType, ListenerRef, ListenerRegistry};
use crate::index::RankedIndex;
use crate::metadata::EntryMetadataFactory;
use crate::persistence::{repository_for, PersistentCacheRepository};
use crate::stats::CacheStatistics;

/// Type-erased view of a cache used by the manager
pub(crate) trait ManagedCache: Lifecycle<Error = CacheError> {
    fn cache_name(&self) -> &str;

    fn expiration(&self) -> &ExpirationConfiguration;

    fn clear_expired(&self);

    fn as_any(&self) -> &dyn Any;
}

/// Outcome of the remapping function passed to [`MemCache::compute_entry`]
pub(crate) enum Remap<V> {
    /// Leave the current mapping (or absence) untouched
    Keep,
    /// Map the key to this value; equal to the current value means no change
    Set(V),
    /// Remove the mapping
    Delete,
}

/// Entries before and after one atomic compute
pub(crate) struct Computed<K, V> {
    previous: Option<Arc<MemCacheEntry<K, V>>>,
    current: Option<Arc<MemCacheEntry<K, V>>>,
}

impl<K, V: Clone> Computed<K, V> {
    fn unchanged(entry: Option<Arc<MemCacheEntry<K, V>>>) -> Self {
        Self { previous: entry.clone(), current: entry }
    }

    pub(crate) const fn inserted(&self) -> bool {
        self.previous.is_none() && self.current.is_some()
    }

    pub(crate) const fn removed(&self) -> bool {
        self.previous.is_some() && self.current.is_none()
    }

    pub(crate) fn changed(&self) -> bool {
        match (&self.previous, &self.current) {
            (None, None) => false,
            (Some(previous), Some(current)) => !Arc::ptr_eq(previous, current),
            _ => true,
        }
    }

    pub(crate) fn previous_value(&self) -> Option<V> {
        self.previous.as_ref().map(|entry| entry.value().clone())
    }

    pub(crate) fn current_value(&self) -> Option<V> {
        self.current.as_ref().map(|entry| entry.value().clone())
    }

    fn event_type(&self, on_removal: EventType) -> Option<EventType> {
        if !self.changed() {
            return None;
        }
        Some(match (&self.previous, &self.current) {
            (None, _) => EventType::Added,
            (_, None) => on_removal,
            _ => EventType::Updated,
        })
    }
}

struct CacheInner<K, V> {
    name: Arc<str>,
    config: CacheConfiguration<K, V>,
    segments: Arc<Segments<K, V>>,
    index: RankedIndex<K>,
    factory: Arc<EntryMetadataFactory>,
    statistics: CacheStatistics,
    listeners: ListenerRegistry<K, V>,
    status: StatusCell,
    repository: Box<dyn PersistentCacheRepository<K, V>>,
    invoker: Arc<AsyncOpsInvoker>,
    clock: Arc<dyn Clock>,
    nearest_expiration: AtomicI64,
    sweep_lock: Mutex<()>,
}

/// A named, bounded, concurrent key/value cache
///
/// Handles are cheap to clone and share one underlying store. Caches are
/// created and initialized by a [`CacheManager`](crate::manager::CacheManager)
/// and obtained through `get_cache`.
pub struct MemCache<K, V> {
    inner: Arc<CacheInner<K, V>>,
}

impl<K, V> Clone for MemCache<K, V> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<K: CacheKey, V: CacheValue> fmt::Debug for MemCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemCache")
            .field("name", &self.inner.name)
            .field("policy", &self.inner.config.eviction_policy())
            .field("status", &self.inner.status.get())
            .field("entries", &self.len())
            .finish()
    }
}

impl<K: CacheKey, V: CacheValue> MemCache<K, V> {
    pub(crate) fn create(
        config: CacheConfiguration<K, V>,
        invoker: Arc<AsyncOpsInvoker>,
        clock: Arc<dyn Clock>,
    ) -> CacheResult<Self> {
        if invoker.is_closed() {
            return Err(CacheError::AsyncOperation(format!(
                "cannot create cache '{}': async operations pool is closed",
                config.cache_name()
            )));
        }

        let name: Arc<str> = Arc::from(config.cache_name());
        let factory = Arc::new(EntryMetadataFactory::new(
            config.eviction_policy(),
            config.expiration(),
            Arc::clone(&clock),
        ));
        let segments = Arc::new(Segments::new(config.memory_store()));
        let counted = Arc::clone(&segments);
        let repository = repository_for(&config, &factory);
        debug!(
            cache = %name,
            policy = %config.eviction_policy(),
            segments = segments.count(),
            "Cache created"
        );

        let inner = CacheInner {
            listeners: ListenerRegistry::new(Arc::clone(&name)),
            name,
            segments,
            index: RankedIndex::new(),
            factory,
            statistics: CacheStatistics::new(move || counted.len()),
            status: StatusCell::default(),
            repository,
            invoker,
            clock,
            nearest_expiration: AtomicI64::new(0),
            sweep_lock: Mutex::new(()),
            config,
        };
        Ok(Self { inner: Arc::new(inner) })
    }

    /// Cache name
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Configuration the cache was created with
    pub fn configuration(&self) -> &CacheConfiguration<K, V> {
        &self.inner.config
    }

    /// Live statistics
    pub fn statistics(&self) -> &CacheStatistics {
        &self.inner.statistics
    }

    /// Current lifecycle status
    pub fn status(&self) -> ComponentStatus {
        self.inner.status.get()
    }

    /// Number of entries across all segments
    pub fn len(&self) -> usize {
        self.inner.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Register a listener for entry events.
    ///
    /// Returns `false` if the same listener instance is already registered.
    /// Only allowed while the cache is initializing or running.
    pub fn register_event_listener(&self, listener: ListenerRef<K, V>) -> CacheResult<bool> {
        self.inner.status.require(
            "register_event_listener",
            &[ComponentStatus::Initializing, ComponentStatus::Running],
        )?;
        Ok(self.inner.listeners.register(listener))
    }

    /// Deregister a previously registered listener.
    ///
    /// Returns `false` if it was not registered.
    pub fn deregister_event_listener(&self, listener: &ListenerRef<K, V>) -> CacheResult<bool> {
        self.inner.status.require(
            "deregister_event_listener",
            &[ComponentStatus::Initializing, ComponentStatus::Running],
        )?;
        Ok(self.inner.listeners.deregister(listener))
    }

    /// Atomically remap the entry for `key`.
    ///
    /// `remap` runs under the segment's write lock and must not call back
    /// into this cache. A panic inside it leaves the mapping untouched.
    /// Deletions are reported with `on_removal` as the event type.
    pub(crate) fn compute_entry<F>(&self, key: &K, on_removal: EventType, remap: F) -> Computed<K, V>
    where
        F: FnOnce(&K, Option<&Arc<MemCacheEntry<K, V>>>) -> Remap<V>,
    {
        let inner = &*self.inner;
        let computed = match inner.segments.segment_for(key).entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                let existing = Arc::clone(occupied.get());
                match remap(key, Some(&existing)) {
                    Remap::Keep => Computed::unchanged(Some(existing)),
                    Remap::Set(value) if value == *existing.value() => {
                        Computed::unchanged(Some(existing))
                    }
                    Remap::Set(value) => {
                        let updated = Arc::new(MemCacheEntry::new(
                            value,
                            Arc::clone(existing.metadata()),
                        ));
                        occupied.insert(Arc::clone(&updated));
                        Computed { previous: Some(existing), current: Some(updated) }
                    }
                    Remap::Delete => {
                        occupied.remove();
                        inner.index.remove(existing.metadata());
                        Computed { previous: Some(existing), current: None }
                    }
                }
            }
            Entry::Vacant(vacant) => match remap(key, None) {
                Remap::Set(value) => {
                    let metadata = Arc::new(inner.factory.create(key.clone()));
                    let created = Arc::new(MemCacheEntry::new(value, Arc::clone(&metadata)));
                    inner.index.insert(metadata);
                    drop(vacant.insert(Arc::clone(&created)));
                    Computed { previous: None, current: Some(created) }
                }
                Remap::Keep | Remap::Delete => Computed::unchanged(None),
            },
        };

        if let Some(event_type) = computed.event_type(on_removal) {
            self.fire(key, &computed, event_type);
        }
        computed
    }

    fn fire(&self, key: &K, computed: &Computed<K, V>, event_type: EventType) {
        let listeners = &self.inner.listeners;
        if listeners.is_empty() {
            return;
        }
        let event = CacheEntryEvent::new(
            Arc::clone(&self.inner.name),
            key.clone(),
            computed.previous_value(),
            computed.current_value(),
            event_type,
        );
        listeners.notify(&event);
    }

    fn restore(&self) -> CacheResult<()> {
        let inner = &*self.inner;
        let restored = inner.repository.load()?;
        let count = restored.len();

        for entry in restored {
            let entry = Arc::new(entry);
            let key = entry.key().clone();
            inner.index.insert(Arc::clone(entry.metadata()));
            if let Some(replaced) = inner.segments.segment_for(&key).insert(key, entry) {
                inner.index.remove(replaced.metadata());
            }
        }
        self.enforce_capacity(None);

        if count > 0 {
            info!(cache = %inner.name, restored = count, entries = self.len(), "Cache contents restored");
        }
        Ok(())
    }

    fn finish_transition<F>(&self, operation: &str, target: ComponentStatus, step: F) -> CacheResult<()>
    where
        F: FnOnce() -> CacheResult<()>,
    {
        let outcome = catch_unwind(AssertUnwindSafe(step))
            .unwrap_or_else(|payload| Err(CacheError::from_panic(operation, payload.as_ref())));
        match outcome {
            Ok(()) => {
                self.inner.status.set(target);
                info!(cache = %self.inner.name, status = %target, "Cache {operation} completed");
                Ok(())
            }
            Err(e) => {
                self.inner.status.set(ComponentStatus::Failed);
                error!(cache = %self.inner.name, error = %e, "Cache {operation} failed");
                Err(e)
            }
        }
    }
}

impl<K: CacheKey, V: CacheValue> Lifecycle for MemCache<K, V> {
    type Error = CacheError;

    /// Restore persisted contents and register configured listeners.
    #[instrument(skip(self), fields(cache = %self.inner.name))]
    fn initialize(&self) -> CacheResult<()> {
        self.inner.status.transition(
            "initialize",
            ComponentStatus::Unavailable,
            ComponentStatus::Initializing,
        )?;

        self.finish_transition("initialize", ComponentStatus::Running, || {
            self.restore()?;
            for listener in self.inner.config.listeners() {
                self.inner.listeners.register(Arc::clone(listener));
            }
            Ok(())
        })
    }

    /// Persist the current contents.
    #[instrument(skip(self), fields(cache = %self.inner.name))]
    fn shutdown(&self) -> CacheResult<()> {
        self.inner.status.transition(
            "shutdown",
            ComponentStatus::Running,
            ComponentStatus::Stopping,
        )?;

        self.finish_transition("shutdown", ComponentStatus::Terminated, || {
            self.inner.repository.save(&self.inner.segments.view())
        })
    }

    fn status(&self) -> ComponentStatus {
        self.inner.status.get()
    }
}

impl<K: CacheKey, V: CacheValue> ManagedCache for MemCache<K, V> {
    fn cache_name(&self) -> &str {
        self.name()
    }

    fn expiration(&self) -> &ExpirationConfiguration {
        self.inner.config.expiration()
    }

    fn clear_expired(&self) {
        MemCache::clear_expired(self);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use memcache_common::time::MockClock;

    use super::*;
    use crate::config::{EvictionPolicy, MemoryStoreConfiguration};

    pub(crate) fn configuration<K: CacheKey, V: CacheValue>(
        name: &str,
        policy: EvictionPolicy,
        max_entries: usize,
        expiration: ExpirationConfiguration,
    ) -> CacheConfiguration<K, V> {
        CacheConfiguration::builder()
            .cache_name(name)
            .eviction_policy(policy)
            .memory_store(MemoryStoreConfiguration::builder().max_entries(max_entries).build().unwrap())
            .expiration(expiration)
            .build()
            .unwrap()
    }

    pub(crate) fn started<K: CacheKey, V: CacheValue>(
        config: CacheConfiguration<K, V>,
        clock: &MockClock,
    ) -> MemCache<K, V> {
        let invoker = Arc::new(AsyncOpsInvoker::new(1).unwrap());
        let cache = MemCache::create(config, invoker, Arc::new(clock.clone())).unwrap();
        cache.initialize().unwrap();
        cache
    }

    pub(crate) fn eternal_cache(policy: EvictionPolicy, max_entries: usize) -> MemCache<u32, String> {
        started(
            configuration("test", policy, max_entries, ExpirationConfiguration::eternal()),
            &MockClock::at_millis(0),
        )
    }
}

#[cfg(test)]
mod tests {
    use memcache_common::time::MockClock;

    use super::test_support::*;
    use super::*;
    use crate::config::{EvictionPolicy, PersistentStoreConfiguration};

    /// Validates lifecycle transitions of a standalone cache.
    ///
    /// # Test Steps
    /// 1. Create a cache; listener registration is rejected before init
    /// 2. Initialize twice; the second call fails with a lifecycle error
    /// 3. Shut down and verify the TERMINATED status
    #[test]
    fn test_lifecycle_transitions() {
        let invoker = Arc::new(AsyncOpsInvoker::new(1).unwrap());
        let config = configuration::<u32, String>(
            "lifecycle",
            EvictionPolicy::Lru,
            10,
            ExpirationConfiguration::eternal(),
        );
        let cache = MemCache::create(config, invoker, Arc::new(MockClock::at_millis(0))).unwrap();
        assert_eq!(cache.status(), ComponentStatus::Unavailable);

        struct Noop;
        impl crate::events::CacheEntryEventListener<u32, String> for Noop {
            fn on_event(&self, _event: &CacheEntryEvent<u32, String>) {}
        }
        let listener: ListenerRef<u32, String> = Arc::new(Noop);
        assert!(matches!(
            cache.register_event_listener(Arc::clone(&listener)),
            Err(CacheError::Lifecycle(_))
        ));

        cache.initialize().unwrap();
        assert!(cache.is_running());
        assert!(matches!(cache.initialize(), Err(CacheError::Lifecycle(_))));
        assert!(cache.register_event_listener(listener).unwrap());

        cache.shutdown().unwrap();
        assert_eq!(cache.status(), ComponentStatus::Terminated);
        assert!(cache.shutdown().is_err());
    }

    /// Validates that a cache cannot be created on a closed async pool.
    #[test]
    fn test_create_requires_open_pool() {
        let invoker = Arc::new(AsyncOpsInvoker::new(1).unwrap());
        invoker.close();
        let config = configuration::<u32, u32>(
            "closed",
            EvictionPolicy::Fifo,
            4,
            ExpirationConfiguration::eternal(),
        );
        let result = MemCache::create(config, invoker, Arc::new(MockClock::at_millis(0)));
        assert!(matches!(result, Err(CacheError::AsyncOperation(_))));
    }

    /// Validates that shutdown persists and initialize restores entries,
    /// trimming a snapshot larger than the configured capacity.
    ///
    /// # Test Steps
    /// 1. Fill a persistent cache with five entries and shut it down
    /// 2. Start a new cache with the same location but capacity three
    /// 3. Verify three entries survive and the snapshot file is consumed
    #[test]
    fn test_restore_trims_to_capacity() {
        let dir = tempfile::tempdir().unwrap();
        let clock = MockClock::at_millis(100);
        let persistent = |max: usize| {
            CacheConfiguration::<u32, String>::builder()
                .cache_name("persisted")
                .eviction_policy(EvictionPolicy::Fifo)
                .memory_store(
                    crate::config::MemoryStoreConfiguration::builder()
                        .max_entries(max)
                        .build()
                        .unwrap(),
                )
                .persistent_store(
                    PersistentStoreConfiguration::builder()
                        .location(dir.path().to_string_lossy())
                        .uid("node-1")
                        .build()
                        .unwrap(),
                )
                .expiration(ExpirationConfiguration::eternal())
                .build()
                .unwrap()
        };

        let cache = started(persistent(10), &clock);
        for key in 0..5 {
            cache.put(key, format!("v{key}"));
        }
        cache.shutdown().unwrap();
        let snapshot = dir.path().join("node-1").join("persisted.bin");
        assert!(snapshot.exists());

        let restored = started(persistent(3), &clock);
        assert_eq!(restored.len(), 3);
        assert_eq!(restored.inner.index.len(), 3);
        assert!(!snapshot.exists());
    }

    /// Validates that a panicking remap leaves the mapping untouched.
    #[test]
    fn test_panicking_remap_keeps_entry() {
        let cache = eternal_cache(EvictionPolicy::Lru, 10);
        cache.put(1, "kept".to_string());

        let result = std::panic::catch_unwind(AssertUnwindSafe(|| {
            cache.compute(1, |_, _| -> Option<String> { panic!("remap failure") })
        }));
        assert!(result.is_err());
        assert_eq!(cache.get(&1).as_deref(), Some("kept"));
        assert_eq!(cache.inner.index.len(), 1);
    }
}
