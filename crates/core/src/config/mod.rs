//! Cache and manager configuration.
//!
//! - **[`cache`]**: per-cache settings and eviction policy
//! - **[`expiration`]**: idle timeout / lifespan reconciliation
//! - **[`store`]**: memory and persistent store settings
//! - **[`manager`]**: manager configuration and its sources
//! - **[`loader`]**: pool sizing from files and environment variables

pub mod cache;
pub mod expiration;
pub mod loader;
pub mod manager;
pub mod store;

pub use cache::{CacheConfiguration, CacheConfigurationBuilder, EvictionPolicy};
pub use expiration::{ExpirationConfiguration, ExpirationConfigurationBuilder, DISABLED};
pub use loader::{ManagerSettings, SettingsConfigurationSource};
pub(crate) use manager::CacheDefinition;
pub use manager::{
    default_async_parallelism, Configuration, ConfigurationBuilder, ConfigurationSource,
};
pub use store::{
    MemoryStoreConfiguration, MemoryStoreConfigurationBuilder, PersistentStoreConfiguration,
    PersistentStoreConfigurationBuilder,
};
