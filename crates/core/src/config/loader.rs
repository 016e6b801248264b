//! Manager settings loader
//!
//! Pool sizes come from (lowest to highest precedence):
//! 1. Built-in defaults
//! 2. An optional JSON or TOML settings file (format chosen by extension)
//! 3. Environment variables
//!
//! ## Environment Variables
//! - `MEMCACHE_CLEANING_POOL_SIZE`: threads running expiration sweeps
//! - `MEMCACHE_ASYNC_PARALLELISM`: threads running `*_async` operations
//!
//! Cache definitions themselves are supplied programmatically.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::cache::CacheConfiguration;
use super::manager::{default_async_parallelism, CacheDefinition, Configuration, ConfigurationSource};
use crate::entry::{CacheKey, CacheValue};
use crate::error::{CacheError, CacheResult};

/// Environment variable overriding [`ManagerSettings::cleaning_pool_size`]
pub const ENV_CLEANING_POOL_SIZE: &str = "MEMCACHE_CLEANING_POOL_SIZE";
/// Environment variable overriding [`ManagerSettings::async_parallelism`]
pub const ENV_ASYNC_PARALLELISM: &str = "MEMCACHE_ASYNC_PARALLELISM";

/// Pool sizing of a cache manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerSettings {
    /// Threads running expiration sweeps
    pub cleaning_pool_size: usize,
    /// Threads running `*_async` operations
    pub async_parallelism: usize,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            cleaning_pool_size: Self::DEFAULT_CLEANING_POOL_SIZE,
            async_parallelism: default_async_parallelism(),
        }
    }
}

impl ManagerSettings {
    /// Default number of sweep threads
    pub const DEFAULT_CLEANING_POOL_SIZE: usize = 1;

    /// Load settings from a JSON or TOML file
    ///
    /// # Errors
    /// Returns `CacheError::Common` if the file cannot be read or parsed and
    /// `CacheError::InvalidConfiguration` for unsupported extensions.
    pub fn from_file(path: &Path) -> CacheResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let settings: Self = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str(&contents)?,
            Some("toml") => toml::from_str(&contents)
                .map_err(memcache_common::error::CommonError::from)?,
            other => {
                return Err(CacheError::config(format!(
                    "unsupported settings format {:?} for {}",
                    other.unwrap_or(""),
                    path.display()
                )))
            }
        };
        debug!(path = %path.display(), "Manager settings loaded from file");
        Ok(settings)
    }

    /// Apply environment variable overrides
    ///
    /// # Errors
    /// Returns `CacheError::InvalidConfiguration` if a variable is set but is
    /// not a positive integer.
    pub fn with_env_overrides(self) -> CacheResult<Self> {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> CacheResult<Self> {
        if let Some(size) = parse_override(ENV_CLEANING_POOL_SIZE, lookup(ENV_CLEANING_POOL_SIZE))? {
            self.cleaning_pool_size = size;
        }
        if let Some(size) = parse_override(ENV_ASYNC_PARALLELISM, lookup(ENV_ASYNC_PARALLELISM))? {
            self.async_parallelism = size;
        }
        Ok(self)
    }
}

fn parse_override(name: &str, raw: Option<String>) -> CacheResult<Option<usize>> {
    raw.map(|value| match value.trim().parse::<usize>() {
        Ok(n) if n >= 1 => Ok(n),
        _ => Err(CacheError::config(format!("{name} must be a positive integer, got '{value}'"))),
    })
    .transpose()
}

/// Configuration source combining loaded settings with cache definitions
#[derive(Default)]
pub struct SettingsConfigurationSource {
    settings_path: Option<PathBuf>,
    caches: Vec<Arc<dyn CacheDefinition>>,
}

impl SettingsConfigurationSource {
    /// Source with default settings plus environment overrides
    pub fn new() -> Self {
        Self::default()
    }

    /// Read pool sizes from `path` before applying environment overrides
    #[must_use]
    pub fn settings_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.settings_path = Some(path.into());
        self
    }

    /// Add a cache definition
    #[must_use]
    pub fn cache<K: CacheKey, V: CacheValue>(mut self, config: CacheConfiguration<K, V>) -> Self {
        self.caches.push(Arc::new(config));
        self
    }
}

impl ConfigurationSource for SettingsConfigurationSource {
    fn pull(&self) -> CacheResult<Configuration> {
        let settings = match &self.settings_path {
            Some(path) => ManagerSettings::from_file(path)?,
            None => ManagerSettings::default(),
        }
        .with_env_overrides()?;

        info!(
            cleaning_pool_size = settings.cleaning_pool_size,
            async_parallelism = settings.async_parallelism,
            caches = self.caches.len(),
            "Cache manager configuration resolved"
        );

        self.caches
            .iter()
            .fold(Configuration::builder().settings(&settings), |builder, cache| {
                builder.definition(Arc::clone(cache))
            })
            .build()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    /// Validates TOML and JSON settings files.
    ///
    /// Assertions:
    /// - Both formats parse; missing fields fall back to defaults.
    /// - Unknown extensions are rejected.
    #[test]
    fn test_from_file_formats() {
        let dir = tempfile::tempdir().unwrap();

        let toml_path = dir.path().join("memcache.toml");
        std::fs::File::create(&toml_path)
            .unwrap()
            .write_all(b"cleaning_pool_size = 3\nasync_parallelism = 5\n")
            .unwrap();
        let settings = ManagerSettings::from_file(&toml_path).unwrap();
        assert_eq!(settings.cleaning_pool_size, 3);
        assert_eq!(settings.async_parallelism, 5);

        let json_path = dir.path().join("memcache.json");
        std::fs::write(&json_path, r#"{ "cleaning_pool_size": 2 }"#).unwrap();
        let settings = ManagerSettings::from_file(&json_path).unwrap();
        assert_eq!(settings.cleaning_pool_size, 2);
        assert_eq!(settings.async_parallelism, default_async_parallelism());

        let yaml_path = dir.path().join("memcache.yaml");
        std::fs::write(&yaml_path, "cleaning_pool_size: 2").unwrap();
        assert!(matches!(
            ManagerSettings::from_file(&yaml_path),
            Err(CacheError::InvalidConfiguration(_))
        ));
    }

    /// Validates environment overrides through an injected lookup.
    ///
    /// Assertions:
    /// - Set variables replace file values.
    /// - Zero or non-numeric values are rejected.
    #[test]
    fn test_overrides() {
        let base = ManagerSettings { cleaning_pool_size: 1, async_parallelism: 1 };

        let settings = base
            .with_overrides(|name| (name == ENV_ASYNC_PARALLELISM).then(|| "4".to_string()))
            .unwrap();
        assert_eq!(settings.async_parallelism, 4);
        assert_eq!(settings.cleaning_pool_size, 1);

        assert!(base.with_overrides(|_| Some("0".to_string())).is_err());
        assert!(base.with_overrides(|_| Some("many".to_string())).is_err());
    }

    /// Validates a missing settings file surfaces as an error.
    #[test]
    fn test_missing_file_is_error() {
        let source = SettingsConfigurationSource::new().settings_file("/nonexistent/memcache.toml");
        assert!(source.pull().is_err());
    }
}
