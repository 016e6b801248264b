//! Memory and persistent store settings.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{CacheError, CacheResult};

/// Capacity and sharding of the in-memory store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemoryStoreConfiguration {
    max_entries: usize,
    concurrency_level: usize,
}

impl MemoryStoreConfiguration {
    /// Start building a configuration
    pub fn builder() -> MemoryStoreConfigurationBuilder {
        MemoryStoreConfigurationBuilder::default()
    }

    /// Maximum number of live entries
    pub const fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Requested parallelism; never larger than `max_entries`
    pub const fn concurrency_level(&self) -> usize {
        self.concurrency_level
    }
}

/// Builder for [`MemoryStoreConfiguration`]
#[derive(Debug, Clone, Default)]
pub struct MemoryStoreConfigurationBuilder {
    max_entries: Option<usize>,
    concurrency_level: Option<usize>,
}

impl MemoryStoreConfigurationBuilder {
    /// Maximum number of live entries (required, at least 1)
    #[must_use]
    pub const fn max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = Some(max_entries);
        self
    }

    /// Expected number of concurrently writing threads (default 16)
    #[must_use]
    pub const fn concurrency_level(mut self, level: usize) -> Self {
        self.concurrency_level = Some(level);
        self
    }

    /// Validate, clamping the concurrency level to `max_entries`
    pub fn build(self) -> CacheResult<MemoryStoreConfiguration> {
        let max_entries = match self.max_entries {
            Some(n) if n >= 1 => n,
            Some(n) => {
                return Err(CacheError::config(format!("max_entries must be >= 1, got {n}")))
            }
            None => return Err(CacheError::config("max_entries is required")),
        };
        let concurrency_level = self.concurrency_level.unwrap_or(16);
        if concurrency_level == 0 {
            return Err(CacheError::config("concurrency_level must be >= 1"));
        }
        Ok(MemoryStoreConfiguration {
            max_entries,
            concurrency_level: concurrency_level.min(max_entries),
        })
    }
}

/// Where and under which identity a cache snapshot is stored
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PersistentStoreConfiguration {
    location: Option<String>,
    uid: String,
}

impl PersistentStoreConfiguration {
    /// Start building a configuration
    pub fn builder() -> PersistentStoreConfigurationBuilder {
        PersistentStoreConfigurationBuilder::default()
    }

    /// Configured location, possibly containing placeholders
    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    /// Unique id separating snapshots of different applications
    pub fn uid(&self) -> &str {
        &self.uid
    }

    /// Directory holding this store's snapshots: `<location>/<uid>`.
    ///
    /// `${tmpdir}`, `${home}` and `${cwd}` are expanded; without a location
    /// the system temp directory joined with `memcache` is used.
    pub fn resolve_directory(&self) -> PathBuf {
        let base = self.location.as_deref().map_or_else(
            || std::env::temp_dir().join("memcache"),
            |location| PathBuf::from(expand_placeholders(location)),
        );
        base.join(&self.uid)
    }
}

fn expand_placeholders(location: &str) -> String {
    let tmpdir = std::env::temp_dir();
    let home = std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|| tmpdir.clone());
    let cwd = std::env::current_dir().unwrap_or_else(|_| tmpdir.clone());

    location
        .replace("${tmpdir}", &tmpdir.to_string_lossy())
        .replace("${home}", &home.to_string_lossy())
        .replace("${cwd}", &cwd.to_string_lossy())
}

/// Builder for [`PersistentStoreConfiguration`]
#[derive(Debug, Clone, Default)]
pub struct PersistentStoreConfigurationBuilder {
    location: Option<String>,
    uid: Option<String>,
}

impl PersistentStoreConfigurationBuilder {
    /// Base directory; supports `${tmpdir}`, `${home}` and `${cwd}`
    #[must_use]
    pub fn location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Unique id (required, not blank)
    #[must_use]
    pub fn uid(mut self, uid: impl Into<String>) -> Self {
        self.uid = Some(uid.into());
        self
    }

    /// Validate the settings
    pub fn build(self) -> CacheResult<PersistentStoreConfiguration> {
        let uid = match self.uid {
            Some(uid) if !uid.trim().is_empty() => uid,
            _ => return Err(CacheError::config("persistent store uid must not be blank")),
        };
        let location = self.location.filter(|l| !l.trim().is_empty());
        Ok(PersistentStoreConfiguration { location, uid })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Validates the concurrency clamp and defaults.
    ///
    /// Assertions:
    /// - A concurrency level above `max_entries` is lowered to it.
    /// - The default level is 16 when capacity allows.
    #[test]
    fn test_concurrency_level_clamped() {
        let config =
            MemoryStoreConfiguration::builder().max_entries(4).concurrency_level(64).build().unwrap();
        assert_eq!(config.concurrency_level(), 4);

        let config = MemoryStoreConfiguration::builder().max_entries(1_000).build().unwrap();
        assert_eq!(config.concurrency_level(), 16);
    }

    /// Validates that capacity is mandatory and positive.
    #[test]
    fn test_max_entries_required() {
        assert!(MemoryStoreConfiguration::builder().build().is_err());
        assert!(MemoryStoreConfiguration::builder().max_entries(0).build().is_err());
        assert!(MemoryStoreConfiguration::builder()
            .max_entries(1)
            .concurrency_level(0)
            .build()
            .is_err());
    }

    /// Validates uid checks and placeholder expansion.
    ///
    /// Assertions:
    /// - A blank uid is rejected.
    /// - `${tmpdir}` expands to the system temp dir and the uid is appended.
    #[test]
    fn test_persistent_store_directory() {
        assert!(PersistentStoreConfiguration::builder().uid("  ").build().is_err());

        let config = PersistentStoreConfiguration::builder()
            .location("${tmpdir}/snapshots")
            .uid("app-1")
            .build()
            .unwrap();
        let expected = PathBuf::from(format!("{}/snapshots", std::env::temp_dir().display()))
            .join("app-1");
        assert_eq!(config.resolve_directory(), expected);

        let config = PersistentStoreConfiguration::builder().uid("app-2").build().unwrap();
        assert_eq!(
            config.resolve_directory(),
            std::env::temp_dir().join("memcache").join("app-2")
        );
    }
}
