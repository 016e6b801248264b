//! Async execution of synchronous cache operations.

use futures::future::{self, BoxFuture, FutureExt};
use memcache_common::runtime::{WorkerPool, WorkerPoolConfig};
use tracing::debug;

use crate::error::{CacheError, CacheResult};

/// Future returned by every `*_async` cache method
pub type AsyncResult<T> = BoxFuture<'static, CacheResult<T>>;

/// Thread name prefix of async operation workers
pub const ASYNC_POOL_NAME: &str = "memcache-async-ops";

/// Bounded pool running cache operations off the caller's thread
///
/// An operation has exactly the semantics of its synchronous twin; it just
/// runs on a pool worker. Dropping the returned future does not stop an
/// operation that has already started.
#[derive(Debug)]
pub struct AsyncOpsInvoker {
    pool: WorkerPool,
}

impl AsyncOpsInvoker {
    /// Start a pool with `parallelism` workers
    pub fn new(parallelism: usize) -> CacheResult<Self> {
        let pool = WorkerPool::new(WorkerPoolConfig::new(ASYNC_POOL_NAME, parallelism.max(1)))?;
        Ok(Self { pool })
    }

    /// Run `op` on the pool and resolve to its result
    pub fn invoke<U, F>(&self, op: F) -> AsyncResult<U>
    where
        F: FnOnce() -> U + Send + 'static,
        U: Send + 'static,
    {
        match self.pool.spawn_fn(op) {
            Ok(handle) => async move { handle.await.map_err(CacheError::from) }.boxed(),
            Err(e) => future::ready(Err(CacheError::from(e))).boxed(),
        }
    }

    /// Run `action` on the pool
    pub fn run<F>(&self, action: F) -> AsyncResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.invoke(action)
    }

    /// Whether `close` has been called
    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }

    /// Reject new work and let in-flight operations finish. Idempotent.
    pub fn close(&self) {
        if !self.pool.is_closed() {
            debug!(active = self.pool.active_tasks(), "Closing async operations pool");
        }
        self.pool.close();
    }
}
