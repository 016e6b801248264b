//! Error types shared by the memcache crates
//!
//! [`CommonError`] holds the failure modes that show up in more than one
//! crate (bad settings, encoding, file I/O, worker pools). Crate errors wrap
//! it in a transparent variant and use the two macros below to get the
//! std/serde conversions and an [`ErrorClassification`] implementation:
//!
//! ```rust,ignore
//! #[derive(Debug, thiserror::Error)]
//! pub enum StoreError {
//!     #[error("Segment {0} is poisoned")]
//!     Poisoned(usize),
//!
//!     #[error(transparent)]
//!     Common(#[from] CommonError),
//! }
//!
//! impl_error_conversion!(StoreError, Common);
//! impl_error_classification!(StoreError, Common,
//!     Self::Poisoned(_) => {
//!         retryable: false,
//!         severity: ErrorSeverity::Critical,
//!         critical: true,
//!     }
//! );
//! ```

use std::fmt;
use std::io;

use thiserror::Error;

/// Result alias over [`CommonError`]
pub type CommonResult<T> = Result<T, CommonError>;

/// Failure modes shared across crates
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommonError {
    /// A setting was rejected
    #[error("Configuration error in field '{field}': {message}")]
    Config { field: String, message: String },

    /// A document could not be encoded or decoded
    #[error("Serialization error ({format}): {message}")]
    Serialization { format: &'static str, message: String },

    /// File I/O failed
    #[error("Persistence error ({kind}): {message}")]
    Persistence { kind: io::ErrorKind, message: String },

    /// A runtime or thread could not be created
    #[error("Internal error ({context}): {message}")]
    Internal { context: String, message: String },

    /// Work was submitted to a closed executor
    #[error("Task '{task}' was cancelled: {reason}")]
    TaskCancelled { task: String, reason: String },
}

impl CommonError {
    /// Configuration error for `field`
    pub fn config(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Config { field: field.into(), message: message.into() }
    }

    /// Internal error raised while doing `context`
    pub fn internal(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Internal { context: context.into(), message: message.into() }
    }

    /// Rejected task
    pub fn task_cancelled(task: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::TaskCancelled { task: task.into(), reason: reason.into() }
    }
}

impl ErrorClassification for CommonError {
    fn is_retryable(&self) -> bool {
        matches!(self, Self::Persistence { kind: io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock, .. })
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Config { .. } | Self::Serialization { .. } | Self::Persistence { .. } => {
                ErrorSeverity::Error
            }
            Self::TaskCancelled { .. } => ErrorSeverity::Info,
            Self::Internal { .. } => ErrorSeverity::Critical,
        }
    }

    fn is_critical(&self) -> bool {
        matches!(self, Self::Internal { .. })
    }
}

/// Standard interface for classifying errors
pub trait ErrorClassification {
    /// Whether the failed operation may succeed if attempted again
    fn is_retryable(&self) -> bool;

    /// Severity used for logging decisions
    fn severity(&self) -> ErrorSeverity;

    /// Whether the error signals corrupted state or a broken invariant
    fn is_critical(&self) -> bool;
}

/// Error severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    /// Expected during normal operation
    Info,
    /// Degraded but operational
    Warning,
    /// Failure requiring attention
    Error,
    /// Integrity at risk
    Critical,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "INFO"),
            Self::Warning => write!(f, "WARN"),
            Self::Error => write!(f, "ERROR"),
            Self::Critical => write!(f, "CRITICAL"),
        }
    }
}

impl From<io::Error> for CommonError {
    fn from(err: io::Error) -> Self {
        Self::Persistence { kind: err.kind(), message: err.to_string() }
    }
}

impl From<serde_json::Error> for CommonError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization { format: "JSON", message: err.to_string() }
    }
}

impl From<toml::de::Error> for CommonError {
    fn from(err: toml::de::Error) -> Self {
        Self::Serialization { format: "TOML", message: err.to_string() }
    }
}

/// Creates `From<io::Error>` and `From<serde_json::Error>` for a crate error
/// through its `CommonError` variant.
#[macro_export]
macro_rules! impl_error_conversion {
    ($error_type:ty, $variant:ident) => {
        impl From<serde_json::Error> for $error_type {
            fn from(err: serde_json::Error) -> Self {
                Self::$variant($crate::error::CommonError::from(err))
            }
        }

        impl From<std::io::Error> for $error_type {
            fn from(err: std::io::Error) -> Self {
                Self::$variant($crate::error::CommonError::from(err))
            }
        }
    };
}

/// Implements `ErrorClassification` by delegating the `CommonError` variant
/// and listing the crate-specific variants explicitly.
#[macro_export]
macro_rules! impl_error_classification {
    (
        $error_type:ty,
        $common_variant:ident
        $(,
            $variant:pat => {
                retryable: $retryable:expr,
                severity: $severity:expr,
                critical: $critical:expr
                $(,)?
            }
        )*
        $(,)?
    ) => {
        impl $crate::error::ErrorClassification for $error_type {
            fn is_retryable(&self) -> bool {
                match self {
                    Self::$common_variant(e) => $crate::error::ErrorClassification::is_retryable(e),
                    $(
                        $variant => $retryable,
                    )*
                }
            }

            fn severity(&self) -> $crate::error::ErrorSeverity {
                match self {
                    Self::$common_variant(e) => $crate::error::ErrorClassification::severity(e),
                    $(
                        $variant => $severity,
                    )*
                }
            }

            fn is_critical(&self) -> bool {
                match self {
                    Self::$common_variant(e) => $crate::error::ErrorClassification::is_critical(e),
                    $(
                        $variant => $critical,
                    )*
                }
            }
        }
    };
}
