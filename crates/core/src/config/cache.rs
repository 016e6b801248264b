//! Per-cache configuration.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::expiration::ExpirationConfiguration;
use super::store::{MemoryStoreConfiguration, PersistentStoreConfiguration};
use crate::error::{CacheError, CacheResult};
use crate::events::{CacheEntryEventListener, ListenerRef};

/// Victim selection rule applied when a cache exceeds its capacity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EvictionPolicy {
    /// Least recently used
    Lru,
    /// Most recently used
    Mru,
    /// Least frequently used
    Lfu,
    /// First in, first out
    Fifo,
    /// Last in, first out
    Lifo,
}

impl fmt::Display for EvictionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lru => write!(f, "LRU"),
            Self::Mru => write!(f, "MRU"),
            Self::Lfu => write!(f, "LFU"),
            Self::Fifo => write!(f, "FIFO"),
            Self::Lifo => write!(f, "LIFO"),
        }
    }
}

/// Immutable description of one named cache
pub struct CacheConfiguration<K, V> {
    cache_name: String,
    memory_store: MemoryStoreConfiguration,
    persistent_store: Option<PersistentStoreConfiguration>,
    eviction_policy: EvictionPolicy,
    expiration: ExpirationConfiguration,
    listeners: Vec<ListenerRef<K, V>>,
}

impl<K, V> Clone for CacheConfiguration<K, V> {
    fn clone(&self) -> Self {
        Self {
            cache_name: self.cache_name.clone(),
            memory_store: self.memory_store,
            persistent_store: self.persistent_store.clone(),
            eviction_policy: self.eviction_policy,
            expiration: self.expiration,
            listeners: self.listeners.clone(),
        }
    }
}

impl<K, V> fmt::Debug for CacheConfiguration<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheConfiguration")
            .field("cache_name", &self.cache_name)
            .field("memory_store", &self.memory_store)
            .field("persistent_store", &self.persistent_store)
            .field("eviction_policy", &self.eviction_policy)
            .field("expiration", &self.expiration)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl<K, V> CacheConfiguration<K, V> {
    /// Start building a configuration
    pub fn builder() -> CacheConfigurationBuilder<K, V> {
        CacheConfigurationBuilder::default()
    }

    /// Unique cache name
    pub fn cache_name(&self) -> &str {
        &self.cache_name
    }

    /// Capacity and sharding
    pub const fn memory_store(&self) -> &MemoryStoreConfiguration {
        &self.memory_store
    }

    /// Snapshot location, when persistence is enabled
    pub const fn persistent_store(&self) -> Option<&PersistentStoreConfiguration> {
        self.persistent_store.as_ref()
    }

    /// Eviction policy
    pub const fn eviction_policy(&self) -> EvictionPolicy {
        self.eviction_policy
    }

    /// Expiration settings
    pub const fn expiration(&self) -> &ExpirationConfiguration {
        &self.expiration
    }

    /// Listeners registered when the cache is created
    pub fn listeners(&self) -> &[ListenerRef<K, V>] {
        &self.listeners
    }
}

/// Builder for [`CacheConfiguration`]
pub struct CacheConfigurationBuilder<K, V> {
    cache_name: Option<String>,
    memory_store: Option<MemoryStoreConfiguration>,
    persistent_store: Option<PersistentStoreConfiguration>,
    eviction_policy: Option<EvictionPolicy>,
    expiration: Option<ExpirationConfiguration>,
    listeners: Vec<ListenerRef<K, V>>,
}

impl<K, V> Default for CacheConfigurationBuilder<K, V> {
    fn default() -> Self {
        Self {
            cache_name: None,
            memory_store: None,
            persistent_store: None,
            eviction_policy: None,
            expiration: None,
            listeners: Vec::new(),
        }
    }
}

impl<K, V> CacheConfigurationBuilder<K, V> {
    /// Cache name (required, not blank)
    #[must_use]
    pub fn cache_name(mut self, name: impl Into<String>) -> Self {
        self.cache_name = Some(name.into());
        self
    }

    /// Memory store settings (required)
    #[must_use]
    pub const fn memory_store(mut self, config: MemoryStoreConfiguration) -> Self {
        self.memory_store = Some(config);
        self
    }

    /// Enable persistence
    #[must_use]
    pub fn persistent_store(mut self, config: PersistentStoreConfiguration) -> Self {
        self.persistent_store = Some(config);
        self
    }

    /// Eviction policy (required)
    #[must_use]
    pub const fn eviction_policy(mut self, policy: EvictionPolicy) -> Self {
        self.eviction_policy = Some(policy);
        self
    }

    /// Expiration settings (required)
    #[must_use]
    pub const fn expiration(mut self, config: ExpirationConfiguration) -> Self {
        self.expiration = Some(config);
        self
    }

    /// Add a listener registered at cache creation
    #[must_use]
    pub fn listener(mut self, listener: Arc<dyn CacheEntryEventListener<K, V>>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Validate the configuration
    pub fn build(self) -> CacheResult<CacheConfiguration<K, V>> {
        let cache_name = match self.cache_name {
            Some(name) if !name.trim().is_empty() => name,
            _ => return Err(CacheError::config("cache name must not be blank")),
        };
        if !is_file_stem(&cache_name) {
            return Err(CacheError::config(format!(
                "cache name '{cache_name}' must not contain path separators or be '.' or '..'"
            )));
        }
        let memory_store = self.memory_store.ok_or_else(|| {
            CacheError::config(format!("memory store configuration is required for '{cache_name}'"))
        })?;
        let eviction_policy = self.eviction_policy.ok_or_else(|| {
            CacheError::config(format!("eviction policy is required for '{cache_name}'"))
        })?;
        let expiration = self.expiration.ok_or_else(|| {
            CacheError::config(format!("expiration configuration is required for '{cache_name}'"))
        })?;

        Ok(CacheConfiguration {
            cache_name,
            memory_store,
            persistent_store: self.persistent_store,
            eviction_policy,
            expiration,
            listeners: self.listeners,
        })
    }
}

/// Cache names double as snapshot file stems.
fn is_file_stem(name: &str) -> bool {
    !matches!(name, "." | "..") && !name.contains(['/', '\\', '\0'])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory(max: usize) -> MemoryStoreConfiguration {
        MemoryStoreConfiguration::builder().max_entries(max).build().unwrap()
    }

    /// Validates the mandatory fields of a cache configuration.
    ///
    /// Assertions:
    /// - Missing name, memory store, policy or expiration each fail.
    /// - A complete builder succeeds.
    #[test]
    fn test_mandatory_fields() {
        let complete = || {
            CacheConfiguration::<String, String>::builder()
                .cache_name("users")
                .memory_store(memory(10))
                .eviction_policy(EvictionPolicy::Lru)
                .expiration(ExpirationConfiguration::eternal())
        };

        assert!(complete().build().is_ok());
        assert!(complete().cache_name(" ").build().is_err());

        let missing_policy = CacheConfiguration::<String, String>::builder()
            .cache_name("users")
            .memory_store(memory(10))
            .expiration(ExpirationConfiguration::eternal())
            .build();
        assert!(matches!(missing_policy, Err(CacheError::InvalidConfiguration(_))));

        let missing_memory = CacheConfiguration::<String, String>::builder()
            .cache_name("users")
            .eviction_policy(EvictionPolicy::Fifo)
            .expiration(ExpirationConfiguration::eternal())
            .build();
        assert!(missing_memory.is_err());

        let missing_expiration = CacheConfiguration::<String, String>::builder()
            .cache_name("users")
            .memory_store(memory(1))
            .eviction_policy(EvictionPolicy::Fifo)
            .build();
        assert!(missing_expiration.is_err());
    }

    /// Validates that names unusable as a file stem are rejected.
    ///
    /// Assertions:
    /// - Separators, `.` and `..` fail with `InvalidConfiguration`.
    /// - Dots inside an ordinary name are accepted.
    #[test]
    fn test_name_must_be_file_stem() {
        let named = |name: &str| {
            CacheConfiguration::<String, String>::builder()
                .cache_name(name)
                .memory_store(memory(10))
                .eviction_policy(EvictionPolicy::Lru)
                .expiration(ExpirationConfiguration::eternal())
                .build()
        };

        for name in ["../escape", "nested/name", "win\\dir", ".", ".."] {
            assert!(
                matches!(named(name), Err(CacheError::InvalidConfiguration(_))),
                "{name} accepted"
            );
        }
        assert!(named("sessions.v2").is_ok());
    }

    /// Validates policy names in serialized settings.
    #[test]
    fn test_policy_serde_names() {
        let policy: EvictionPolicy = serde_json::from_str("\"LFU\"").unwrap();
        assert_eq!(policy, EvictionPolicy::Lfu);
        assert_eq!(EvictionPolicy::Lifo.to_string(), "LIFO");
    }
}
