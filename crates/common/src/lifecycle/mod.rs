//! Lifecycle management for caches and their manager
//!
//! - **[`manager`]**: the `Lifecycle` trait implemented by lifecycle-managed
//!   components
//! - **[`state`]**: the shared status enum, an atomic status cell enforcing
//!   legal transitions, and the error raised on illegal ones

pub mod manager;
pub mod state;

pub use manager::Lifecycle;
pub use state::{ComponentStatus, LifecycleError, StatusCell};
