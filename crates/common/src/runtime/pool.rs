//! Named worker pool backed by a dedicated tokio runtime.
//!
//! Every spawned task is registered with a [`TaskTracker`]. Closing the pool
//! stops new submissions, waits (bounded) for tracked tasks to finish and
//! then shuts the runtime down. The runtime is torn down on a helper thread
//! so `close` is safe to call from inside another async context.

use std::future::Future;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

use crate::error::{CommonError, CommonResult};

/// Settings for a [`WorkerPool`]
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Thread name prefix, also used in logs and errors
    pub name: String,
    /// Number of worker threads (at least 1)
    pub worker_threads: usize,
    /// Upper bound on waiting for in-flight tasks during close
    pub drain_timeout: Duration,
}

impl WorkerPoolConfig {
    /// Config with the default drain timeout of five seconds
    pub fn new(name: impl Into<String>, worker_threads: usize) -> Self {
        Self { name: name.into(), worker_threads, drain_timeout: Duration::from_secs(5) }
    }

    /// Override the drain timeout
    #[must_use]
    pub const fn drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }
}

/// Worker pool owning its own runtime
pub struct WorkerPool {
    config: WorkerPoolConfig,
    handle: Handle,
    runtime: Mutex<Option<Runtime>>,
    tracker: TaskTracker,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("name", &self.config.name)
            .field("worker_threads", &self.config.worker_threads)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl WorkerPool {
    /// Build the runtime and start its workers
    pub fn new(config: WorkerPoolConfig) -> CommonResult<Self> {
        if config.worker_threads == 0 {
            return Err(CommonError::config(
                "worker_threads",
                format!("pool '{}' needs at least one worker", config.name),
            ));
        }

        let runtime = Builder::new_multi_thread()
            .worker_threads(config.worker_threads)
            .thread_name(config.name.clone())
            .enable_all()
            .build()
            .map_err(|e| {
                CommonError::internal(format!("pool '{}'", config.name), e.to_string())
            })?;

        debug!(pool = %config.name, workers = config.worker_threads, "Worker pool started");

        Ok(Self {
            handle: runtime.handle().clone(),
            runtime: Mutex::new(Some(runtime)),
            tracker: TaskTracker::new(),
            config,
        })
    }

    /// Pool name
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Whether `close` has been called
    pub fn is_closed(&self) -> bool {
        self.tracker.is_closed()
    }

    /// Number of tracked tasks that have not finished yet
    pub fn active_tasks(&self) -> usize {
        self.tracker.len()
    }

    /// Spawn a future on the pool.
    ///
    /// Fails with `TaskCancelled` once the pool is closed.
    pub fn spawn<F>(&self, future: F) -> CommonResult<JoinHandle<F::Output>>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        // Holding the runtime slot orders this submission against `close`.
        let runtime = self.runtime.lock();
        if runtime.is_none() || self.tracker.is_closed() {
            return Err(CommonError::task_cancelled(
                self.config.name.clone(),
                "worker pool is closed",
            ));
        }
        Ok(self.tracker.spawn_on(future, &self.handle))
    }

    /// Run a blocking closure on a pool worker.
    pub fn spawn_fn<F, U>(&self, f: F) -> CommonResult<JoinHandle<U>>
    where
        F: FnOnce() -> U + Send + 'static,
        U: Send + 'static,
    {
        self.spawn(async move { f() })
    }

    /// Stop accepting work, drain in-flight tasks and stop the runtime.
    ///
    /// Idempotent: only the first call does any work.
    pub fn close(&self) {
        let Some(runtime) = self.runtime.lock().take() else {
            return;
        };
        self.tracker.close();

        let tracker = self.tracker.clone();
        let name = self.config.name.clone();
        let drain_timeout = self.config.drain_timeout;
        let teardown = thread::Builder::new().name(format!("{name}-close")).spawn(move || {
            let drained = runtime
                .block_on(async { tokio::time::timeout(drain_timeout, tracker.wait()).await });
            if drained.is_err() {
                warn!(
                    pool = %name,
                    remaining = tracker.len(),
                    "Worker pool drain timed out; abandoning remaining tasks"
                );
            }
            runtime.shutdown_timeout(drain_timeout);
            debug!(pool = %name, "Worker pool stopped");
        });

        match teardown {
            Ok(handle) => {
                if handle.join().is_err() {
                    warn!(pool = %self.config.name, "Worker pool teardown thread panicked");
                }
            }
            Err(e) => warn!(pool = %self.config.name, error = %e, "Failed to spawn teardown thread"),
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        if !self.is_closed() {
            self.close();
        }
    }
}
