//! Owned tokio worker pools
//!
//! - **[`pool`]**: a named multi-thread runtime with task tracking and an
//!   idempotent, drain-then-stop close

pub mod pool;

pub use pool::{WorkerPool, WorkerPoolConfig};
