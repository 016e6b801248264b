//! Key/value bounds and the stored entry record.

use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::metadata::EntryMetadata;

/// Bounds required of cache keys
pub trait CacheKey:
    Eq + Hash + Clone + Debug + Send + Sync + Serialize + DeserializeOwned + 'static
{
}

impl<T> CacheKey for T where
    T: Eq + Hash + Clone + Debug + Send + Sync + Serialize + DeserializeOwned + 'static
{
}

/// Bounds required of cache values
///
/// `PartialEq` lets writes that do not change the value skip the update and
/// its event.
pub trait CacheValue: Clone + PartialEq + Send + Sync + Serialize + DeserializeOwned + 'static {}

impl<T> CacheValue for T where
    T: Clone + PartialEq + Send + Sync + Serialize + DeserializeOwned + 'static
{
}

/// Immutable value record paired with its eviction metadata
///
/// An update replaces the record but keeps the metadata `Arc`, so recency and
/// frequency survive value-only changes.
#[derive(Debug)]
pub struct MemCacheEntry<K, V> {
    value: V,
    metadata: Arc<EntryMetadata<K>>,
}

impl<K, V> MemCacheEntry<K, V> {
    pub(crate) fn new(value: V, metadata: Arc<EntryMetadata<K>>) -> Self {
        Self { value, metadata }
    }

    /// Stored value
    pub const fn value(&self) -> &V {
        &self.value
    }

    /// Entry key
    pub fn key(&self) -> &K {
        self.metadata.key()
    }

    /// Eviction and expiration bookkeeping
    pub fn metadata(&self) -> &Arc<EntryMetadata<K>> {
        &self.metadata
    }
}
