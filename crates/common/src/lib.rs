//! Shared building blocks for the memcache crates.
//!
//! # Feature Tiers
//!
//! - `foundation`: errors, lifecycle status, clocks
//! - `runtime`: tokio worker pools (implies `foundation`)

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

// Foundation tier
// -----------------------------------------------------------------
#[cfg(feature = "foundation")]
#[macro_use]
pub mod error;
#[cfg(feature = "foundation")]
pub mod lifecycle;
#[cfg(feature = "foundation")]
pub mod time;

// Runtime tier
// --------------------------------------------------------------------
#[cfg(feature = "runtime")]
pub mod runtime;

// Re-export commonly used types and traits for convenience
// ------------------------
#[cfg(feature = "foundation")]
pub use error::{CommonError, CommonResult, ErrorClassification, ErrorSeverity};
#[cfg(feature = "foundation")]
pub use lifecycle::{ComponentStatus, Lifecycle, LifecycleError, StatusCell};
#[cfg(feature = "runtime")]
pub use runtime::{WorkerPool, WorkerPoolConfig};
#[cfg(feature = "foundation")]
pub use time::{Clock, MockClock, SystemClock};
