//! Error type for cache, manager and persistence operations.

use memcache_common::error::{CommonError, ErrorSeverity};
use memcache_common::lifecycle::LifecycleError;
use memcache_common::{impl_error_classification, impl_error_conversion};
use thiserror::Error;

/// Result alias used across the engine
pub type CacheResult<T> = Result<T, CacheError>;

/// Errors raised by caches and cache managers
#[derive(Debug, Error)]
pub enum CacheError {
    /// A configuration builder rejected its input
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Operation attempted in the wrong lifecycle state
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    /// `get_cache` was asked for other key/value types than the cache was
    /// created with
    #[error("Cache '{name}' exists with different key/value types (requested {requested})")]
    TypeMismatch { name: String, requested: &'static str },

    /// Loading or saving a cache snapshot failed
    #[error("Persistence failure for cache '{cache}': {message}")]
    Persistence { cache: String, message: String },

    /// A task submitted to the async pool did not complete
    #[error("Async cache operation failed: {0}")]
    AsyncOperation(String),

    /// Unexpected failure during initialization or shutdown
    #[error("Unexpected failure during {operation}: {message}")]
    Unexpected { operation: String, message: String },

    #[error(transparent)]
    Common(#[from] CommonError),
}

impl CacheError {
    /// Configuration error helper
    pub fn config(message: impl Into<String>) -> Self {
        Self::InvalidConfiguration(message.into())
    }

    /// Persistence error helper
    pub fn persistence(cache: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Persistence { cache: cache.into(), message: message.into() }
    }

    /// Wrap an unexpected failure unless it is already a typed engine error.
    pub(crate) fn unexpected(operation: &str, message: impl Into<String>) -> Self {
        Self::Unexpected { operation: operation.to_string(), message: message.into() }
    }

    /// Render a caught panic payload as an unexpected failure.
    pub(crate) fn from_panic(operation: &str, payload: &(dyn std::any::Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "panic with non-string payload".to_string());
        Self::unexpected(operation, message)
    }
}

impl From<tokio::task::JoinError> for CacheError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::AsyncOperation(err.to_string())
    }
}

impl_error_conversion!(CacheError, Common);

impl_error_classification!(CacheError, Common,
    Self::InvalidConfiguration(_) => {
        retryable: false,
        severity: ErrorSeverity::Error,
        critical: false,
    },
    Self::Lifecycle(_) => {
        retryable: false,
        severity: ErrorSeverity::Warning,
        critical: false,
    },
    Self::TypeMismatch { .. } => {
        retryable: false,
        severity: ErrorSeverity::Error,
        critical: false,
    },
    Self::Persistence { .. } => {
        retryable: false,
        severity: ErrorSeverity::Error,
        critical: true,
    },
    Self::AsyncOperation(_) => {
        retryable: false,
        severity: ErrorSeverity::Warning,
        critical: false,
    },
    Self::Unexpected { .. } => {
        retryable: false,
        severity: ErrorSeverity::Critical,
        critical: true,
    },
);
