//! # memcache core
//!
//! Embeddable in-process key/value cache engine.
//!
//! A [`CacheManager`] owns a set of named [`MemCache`] instances. Each cache
//! is bounded by `max_entries` and evicts by one of five policies (LRU, MRU,
//! LFU, FIFO, LIFO); entries may expire by lifespan or idle timeout, and
//! contents can be persisted to disk across restarts.
//!
//! ## Layout
//! - [`config`]: builders for caches, stores, expiration and the manager
//! - [`store`]: the segmented cache and its operations
//! - [`manager`]: cache registry, lifecycle and the cleaning scheduler
//! - [`events`]: entry change listeners
//! - [`persistence`]: snapshot repositories
//! - [`stats`]: per-cache counters
//! - [`async_ops`]: the pool behind the `*_async` operations

pub mod async_ops;
pub mod config;
pub mod entry;
pub mod error;
pub mod events;
mod index;
pub mod manager;
pub mod metadata;
pub mod persistence;
pub mod stats;
pub mod store;

pub use async_ops::{AsyncOpsInvoker, AsyncResult};
pub use config::{
    CacheConfiguration, Configuration, ConfigurationSource, EvictionPolicy,
    ExpirationConfiguration, ManagerSettings, MemoryStoreConfiguration,
    PersistentStoreConfiguration, SettingsConfigurationSource,
};
pub use entry::{CacheKey, CacheValue, MemCacheEntry};
pub use error::{CacheError, CacheResult};
pub use events::{
    CacheEntriesEvent, CacheEntryEvent, CacheEntryEventListener, EventType, ListenerRef,
};
pub use manager::CacheManager;
pub use memcache_common::lifecycle::{ComponentStatus, Lifecycle, LifecycleError};
pub use memcache_common::time::{Clock, MockClock, SystemClock};
pub use stats::{CacheStatistics, StatisticsSnapshot};
pub use store::MemCache;
