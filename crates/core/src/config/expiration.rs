//! Idle timeout and lifespan settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CacheError, CacheResult};

/// Sentinel meaning "this expiration condition is disabled"
pub const DISABLED: i64 = -1;

/// Expiration settings of a cache, in milliseconds.
///
/// A cache is eternal when both the idle timeout and the lifespan are
/// [`DISABLED`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExpirationConfiguration {
    idle_timeout: i64,
    lifespan: i64,
}

impl Default for ExpirationConfiguration {
    fn default() -> Self {
        Self::eternal()
    }
}

impl ExpirationConfiguration {
    /// Configuration with both conditions disabled
    pub const fn eternal() -> Self {
        Self { idle_timeout: DISABLED, lifespan: DISABLED }
    }

    /// Start building a configuration
    pub fn builder() -> ExpirationConfigurationBuilder {
        ExpirationConfigurationBuilder::default()
    }

    /// Idle timeout in ms, or [`DISABLED`]
    pub const fn idle_timeout(&self) -> i64 {
        self.idle_timeout
    }

    /// Lifespan in ms, or [`DISABLED`]
    pub const fn lifespan(&self) -> i64 {
        self.lifespan
    }

    /// `true` iff both conditions are disabled
    pub const fn is_eternal(&self) -> bool {
        self.idle_timeout == DISABLED && self.lifespan == DISABLED
    }

    /// Idle timeout when enabled
    pub fn idle_timeout_duration(&self) -> Option<Duration> {
        enabled_duration(self.idle_timeout)
    }

    /// Lifespan when enabled
    pub fn lifespan_duration(&self) -> Option<Duration> {
        enabled_duration(self.lifespan)
    }

    /// Shortest enabled condition; the natural sweep period for this cache.
    pub fn shortest_interval(&self) -> Option<Duration> {
        match (self.idle_timeout_duration(), self.lifespan_duration()) {
            (Some(idle), Some(lifespan)) => Some(idle.min(lifespan)),
            (idle, lifespan) => idle.or(lifespan),
        }
    }
}

fn enabled_duration(millis: i64) -> Option<Duration> {
    u64::try_from(millis).ok().filter(|ms| *ms > 0).map(Duration::from_millis)
}

/// Builder for [`ExpirationConfiguration`]
///
/// When exactly one of idle timeout and lifespan is set (and the cache is not
/// eternal), the other takes the same value. `eternal(true)` overrides both.
#[derive(Debug, Clone, Default)]
pub struct ExpirationConfigurationBuilder {
    idle_timeout: Option<i64>,
    lifespan: Option<i64>,
    eternal: bool,
}

impl ExpirationConfigurationBuilder {
    /// Idle timeout in milliseconds, `-1` to disable
    #[must_use]
    pub const fn idle_timeout_millis(mut self, millis: i64) -> Self {
        self.idle_timeout = Some(millis);
        self
    }

    /// Idle timeout as a duration
    #[must_use]
    pub fn idle_timeout(self, timeout: Duration) -> Self {
        self.idle_timeout_millis(duration_millis(timeout))
    }

    /// Lifespan in milliseconds, `-1` to disable
    #[must_use]
    pub const fn lifespan_millis(mut self, millis: i64) -> Self {
        self.lifespan = Some(millis);
        self
    }

    /// Lifespan as a duration
    #[must_use]
    pub fn lifespan(self, lifespan: Duration) -> Self {
        self.lifespan_millis(duration_millis(lifespan))
    }

    /// Mark the cache eternal
    #[must_use]
    pub const fn eternal(mut self, eternal: bool) -> Self {
        self.eternal = eternal;
        self
    }

    /// Validate and reconcile the settings
    pub fn build(self) -> CacheResult<ExpirationConfiguration> {
        validate("idle_timeout", self.idle_timeout)?;
        validate("lifespan", self.lifespan)?;

        if self.eternal {
            return Ok(ExpirationConfiguration::eternal());
        }

        let idle_timeout = self.idle_timeout.or(self.lifespan).unwrap_or(DISABLED);
        let lifespan = self.lifespan.or(self.idle_timeout).unwrap_or(DISABLED);
        Ok(ExpirationConfiguration { idle_timeout, lifespan })
    }
}

fn duration_millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

fn validate(field: &str, value: Option<i64>) -> CacheResult<()> {
    match value {
        Some(millis) if millis != DISABLED && millis <= 0 => Err(CacheError::config(format!(
            "{field} must be -1 (disabled) or a positive number of milliseconds, got {millis}"
        ))),
        _ => Ok(()),
    }
}
