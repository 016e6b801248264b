//! Snapshot persistence of cache contents across restarts.
//!
//! - **[`disk`]**: binary snapshot file per cache
//! - [`NoPersistentCacheRepository`]: used when persistence is not configured

pub mod disk;

use std::marker::PhantomData;
use std::sync::Arc;

pub use disk::DiskPersistentCacheRepository;

use crate::config::CacheConfiguration;
use crate::entry::{CacheKey, CacheValue, MemCacheEntry};
use crate::error::CacheResult;
use crate::metadata::EntryMetadataFactory;
use crate::store::EntriesView;

/// Loads a cache's entries at startup and saves them at shutdown
pub trait PersistentCacheRepository<K, V>: Send + Sync {
    /// Entries saved by the previous run; empty when there is nothing to
    /// restore
    fn load(&self) -> CacheResult<Vec<MemCacheEntry<K, V>>>;

    /// Persist every entry of `entries`
    fn save(&self, entries: &EntriesView<'_, K, V>) -> CacheResult<()>;
}

/// Repository that stores nothing
#[derive(Debug, Default)]
pub struct NoPersistentCacheRepository<K, V> {
    _marker: PhantomData<fn() -> (K, V)>,
}

impl<K, V> NoPersistentCacheRepository<K, V> {
    /// Create the no-op repository
    pub const fn new() -> Self {
        Self { _marker: PhantomData }
    }
}

impl<K, V> PersistentCacheRepository<K, V> for NoPersistentCacheRepository<K, V> {
    fn load(&self) -> CacheResult<Vec<MemCacheEntry<K, V>>> {
        Ok(Vec::new())
    }

    fn save(&self, _entries: &EntriesView<'_, K, V>) -> CacheResult<()> {
        Ok(())
    }
}

/// Repository matching the cache's persistent store setting
pub(crate) fn repository_for<K: CacheKey, V: CacheValue>(
    config: &CacheConfiguration<K, V>,
    factory: &Arc<EntryMetadataFactory>,
) -> Box<dyn PersistentCacheRepository<K, V>> {
    match config.persistent_store() {
        Some(store) => Box::new(DiskPersistentCacheRepository::new(
            config.cache_name(),
            &store.resolve_directory(),
            Arc::clone(factory),
        )),
        None => Box::new(NoPersistentCacheRepository::new()),
    }
}
