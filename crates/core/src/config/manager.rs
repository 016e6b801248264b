//! Manager-wide configuration and its sources.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use memcache_common::time::Clock;

use super::cache::CacheConfiguration;
use super::expiration::ExpirationConfiguration;
use super::loader::ManagerSettings;
use crate::async_ops::AsyncOpsInvoker;
use crate::entry::{CacheKey, CacheValue};
use crate::error::{CacheError, CacheResult};
use crate::store::{ManagedCache, MemCache};

/// Type-erased cache configuration the manager can instantiate
pub(crate) trait CacheDefinition: Send + Sync {
    fn cache_name(&self) -> &str;

    fn expiration(&self) -> &ExpirationConfiguration;

    fn instantiate(
        &self,
        invoker: &Arc<AsyncOpsInvoker>,
        clock: &Arc<dyn Clock>,
    ) -> CacheResult<Arc<dyn ManagedCache>>;
}

impl<K: CacheKey, V: CacheValue> CacheDefinition for CacheConfiguration<K, V> {
    fn cache_name(&self) -> &str {
        CacheConfiguration::cache_name(self)
    }

    fn expiration(&self) -> &ExpirationConfiguration {
        CacheConfiguration::expiration(self)
    }

    fn instantiate(
        &self,
        invoker: &Arc<AsyncOpsInvoker>,
        clock: &Arc<dyn Clock>,
    ) -> CacheResult<Arc<dyn ManagedCache>> {
        let cache = MemCache::create(self.clone(), Arc::clone(invoker), Arc::clone(clock))?;
        Ok(Arc::new(cache))
    }
}

/// Default parallelism of the async operations pool: half the available
/// cores, at least one.
pub fn default_async_parallelism() -> usize {
    std::thread::available_parallelism().map_or(1, |n| (n.get() / 2).max(1))
}

/// Everything a manager needs to start
#[derive(Clone)]
pub struct Configuration {
    caches: Vec<Arc<dyn CacheDefinition>>,
    cleaning_pool_size: usize,
    async_parallelism: usize,
}

impl fmt::Debug for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Configuration")
            .field("caches", &self.cache_names())
            .field("cleaning_pool_size", &self.cleaning_pool_size)
            .field("async_parallelism", &self.async_parallelism)
            .finish()
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            caches: Vec::new(),
            cleaning_pool_size: ManagerSettings::DEFAULT_CLEANING_POOL_SIZE,
            async_parallelism: default_async_parallelism(),
        }
    }
}

impl Configuration {
    /// Start building a configuration
    pub fn builder() -> ConfigurationBuilder {
        ConfigurationBuilder::default()
    }

    /// Names of the configured caches, in declaration order
    pub fn cache_names(&self) -> Vec<&str> {
        self.caches.iter().map(|c| c.cache_name()).collect()
    }

    pub(crate) fn cache_definitions(&self) -> &[Arc<dyn CacheDefinition>] {
        &self.caches
    }

    /// Worker threads running expiration sweeps
    pub const fn cleaning_pool_size(&self) -> usize {
        self.cleaning_pool_size
    }

    /// Worker threads running `*_async` cache operations
    pub const fn async_parallelism(&self) -> usize {
        self.async_parallelism
    }
}

/// Builder for [`Configuration`]
#[derive(Default)]
pub struct ConfigurationBuilder {
    caches: Vec<Arc<dyn CacheDefinition>>,
    cleaning_pool_size: Option<usize>,
    async_parallelism: Option<usize>,
}

impl ConfigurationBuilder {
    /// Add a cache created during manager initialization
    #[must_use]
    pub fn cache<K: CacheKey, V: CacheValue>(mut self, config: CacheConfiguration<K, V>) -> Self {
        self.caches.push(Arc::new(config));
        self
    }

    pub(crate) fn definition(mut self, definition: Arc<dyn CacheDefinition>) -> Self {
        self.caches.push(definition);
        self
    }

    /// Sweep pool size (default 1)
    #[must_use]
    pub const fn cleaning_pool_size(mut self, size: usize) -> Self {
        self.cleaning_pool_size = Some(size);
        self
    }

    /// Async pool size (default half the available cores)
    #[must_use]
    pub const fn async_parallelism(mut self, parallelism: usize) -> Self {
        self.async_parallelism = Some(parallelism);
        self
    }

    /// Take both pool sizes from loaded settings
    #[must_use]
    pub const fn settings(mut self, settings: &ManagerSettings) -> Self {
        self.cleaning_pool_size = Some(settings.cleaning_pool_size);
        self.async_parallelism = Some(settings.async_parallelism);
        self
    }

    /// Validate pool sizes and cache name uniqueness
    pub fn build(self) -> CacheResult<Configuration> {
        let cleaning_pool_size =
            self.cleaning_pool_size.unwrap_or(ManagerSettings::DEFAULT_CLEANING_POOL_SIZE);
        if cleaning_pool_size == 0 {
            return Err(CacheError::config("cleaning_pool_size must be >= 1"));
        }
        let async_parallelism = self.async_parallelism.unwrap_or_else(default_async_parallelism);
        if async_parallelism == 0 {
            return Err(CacheError::config("async_parallelism must be >= 1"));
        }

        let mut seen = HashSet::new();
        for cache in &self.caches {
            if !seen.insert(cache.cache_name()) {
                return Err(CacheError::config(format!(
                    "cache '{}' is configured more than once",
                    cache.cache_name()
                )));
            }
        }

        Ok(Configuration { caches: self.caches, cleaning_pool_size, async_parallelism })
    }
}

/// Supplies the configuration pulled by a manager during `initialize`
pub trait ConfigurationSource: Send + Sync {
    /// Produce a configuration
    fn pull(&self) -> CacheResult<Configuration>;
}

impl ConfigurationSource for Configuration {
    fn pull(&self) -> CacheResult<Configuration> {
        Ok(self.clone())
    }
}
