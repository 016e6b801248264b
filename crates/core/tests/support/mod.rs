//! Shared test helpers for `memcache-core` integration tests.
//!
//! Configuration shortcuts, a recording listener and a polling helper for
//! assertions that depend on background sweeps.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use memcache_core::{
    CacheConfiguration, CacheEntriesEvent, CacheEntryEvent, CacheEntryEventListener, CacheKey,
    CacheValue, EventType, EvictionPolicy, ExpirationConfiguration, MemoryStoreConfiguration,
    PersistentStoreConfiguration,
};
use parking_lot::Mutex;

/// Eternal cache configuration with the given policy and capacity.
pub fn eternal<K: CacheKey, V: CacheValue>(
    name: &str,
    policy: EvictionPolicy,
    max_entries: usize,
) -> CacheConfiguration<K, V> {
    builder(name, policy, max_entries).build().expect("valid cache configuration")
}

/// Builder prefilled with name, policy, capacity and eternal expiration.
pub fn builder<K: CacheKey, V: CacheValue>(
    name: &str,
    policy: EvictionPolicy,
    max_entries: usize,
) -> memcache_core::config::CacheConfigurationBuilder<K, V> {
    CacheConfiguration::builder()
        .cache_name(name)
        .eviction_policy(policy)
        .memory_store(
            MemoryStoreConfiguration::builder()
                .max_entries(max_entries)
                .concurrency_level(4)
                .build()
                .expect("valid memory store"),
        )
        .expiration(ExpirationConfiguration::eternal())
}

/// Persistent store rooted at `dir`.
pub fn persistent_store(dir: &Path, uid: &str) -> PersistentStoreConfiguration {
    PersistentStoreConfiguration::builder()
        .location(dir.to_string_lossy())
        .uid(uid)
        .build()
        .expect("valid persistent store")
}

/// One observed entry event
#[derive(Debug, Clone, PartialEq)]
pub struct Observed<K, V> {
    pub event_type: EventType,
    pub key: K,
    pub old_value: Option<V>,
    pub new_value: Option<V>,
}

/// Listener recording every event it receives
pub struct RecordingListener<K, V> {
    events: Mutex<Vec<Observed<K, V>>>,
    batches: Mutex<Vec<(String, EventType)>>,
}

impl<K, V> Default for RecordingListener<K, V> {
    fn default() -> Self {
        Self { events: Mutex::new(Vec::new()), batches: Mutex::new(Vec::new()) }
    }
}

impl<K: Clone, V: Clone> RecordingListener<K, V> {
    pub fn events(&self) -> Vec<Observed<K, V>> {
        self.events.lock().clone()
    }

    pub fn batches(&self) -> Vec<(String, EventType)> {
        self.batches.lock().clone()
    }

    pub fn count(&self, event_type: EventType) -> usize {
        self.events.lock().iter().filter(|e| e.event_type == event_type).count()
    }
}

impl<K, V> CacheEntryEventListener<K, V> for RecordingListener<K, V>
where
    K: Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    fn on_event(&self, event: &CacheEntryEvent<K, V>) {
        self.events.lock().push(Observed {
            event_type: event.event_type(),
            key: event.key().clone(),
            old_value: event.old_value().cloned(),
            new_value: event.new_value().cloned(),
        });
    }

    fn on_batch_event(&self, event: &CacheEntriesEvent) {
        self.batches.lock().push((event.cache_name().to_string(), event.event_type()));
    }
}

/// Poll `condition` until it holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    condition()
}

/// Route engine logs to the test harness; `RUST_LOG` selects the level.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Shared handle to a recording listener
pub fn recorder<K, V>() -> Arc<RecordingListener<K, V>> {
    Arc::new(RecordingListener::default())
}
