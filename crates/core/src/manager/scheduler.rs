//! Periodic expiration sweeps shared by all caches of a manager.
//!
//! Non-eternal caches are ordered by name and split into at most
//! `cleaning_pool_size` contiguous partitions of roughly equal size. Each
//! partition gets one task ticking at the shortest expiration interval of
//! its members. Any change to the cache set cancels every task and rebuilds
//! the plan.

use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;

use memcache_common::runtime::{WorkerPool, WorkerPoolConfig};
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::error::CacheResult;
use crate::store::ManagedCache;

pub(crate) const CLEANING_POOL_NAME: &str = "memcache-cleaning";

/// Split `intervals.len()` caches into at most `workers` contiguous ranges.
///
/// Each range is paired with the smallest interval among its members;
/// ranges without any interval are dropped.
pub(crate) fn plan(intervals: &[Option<Duration>], workers: usize) -> Vec<(Range<usize>, Duration)> {
    if intervals.is_empty() {
        return Vec::new();
    }
    let chunk = intervals.len().div_ceil(workers.max(1));
    (0..intervals.len())
        .step_by(chunk)
        .filter_map(|start| {
            let range = start..(start + chunk).min(intervals.len());
            let period = intervals[range.clone()].iter().flatten().min().copied()?;
            Some((range, period))
        })
        .collect()
}

pub(crate) struct CleaningScheduler {
    pool: WorkerPool,
    workers: usize,
    tasks: Vec<CancellationToken>,
}

impl CleaningScheduler {
    pub(crate) fn new(workers: usize) -> CacheResult<Self> {
        let pool = WorkerPool::new(WorkerPoolConfig::new(CLEANING_POOL_NAME, workers))?;
        Ok(Self { pool, workers, tasks: Vec::new() })
    }

    /// Cancel every sweep task and schedule new ones for `caches`.
    ///
    /// With `start_immediately` the first sweep runs right away, otherwise
    /// after one period. Returns the number of scheduled tasks.
    pub(crate) fn reschedule(
        &mut self,
        caches: impl IntoIterator<Item = Arc<dyn ManagedCache>>,
        start_immediately: bool,
    ) -> CacheResult<usize> {
        self.cancel_all();

        let mut cleanable: Vec<_> =
            caches.into_iter().filter(|cache| !cache.expiration().is_eternal()).collect();
        cleanable.sort_by(|l, r| l.cache_name().cmp(r.cache_name()));
        let intervals: Vec<_> =
            cleanable.iter().map(|cache| cache.expiration().shortest_interval()).collect();

        for (range, period) in plan(&intervals, self.workers) {
            let members = cleanable[range].to_vec();
            let names: Vec<&str> = members.iter().map(|cache| cache.cache_name()).collect();
            debug!(caches = ?names, period_ms = period.as_millis(), "Scheduling expiration sweeps");

            let token = CancellationToken::new();
            self.pool.spawn(sweep_loop(members, period, start_immediately, token.clone()))?;
            self.tasks.push(token);
        }
        Ok(self.tasks.len())
    }

    pub(crate) fn cancel_all(&mut self) {
        for token in self.tasks.drain(..) {
            token.cancel();
        }
    }

    pub(crate) fn close(&mut self) {
        self.cancel_all();
        self.pool.close();
    }
}

async fn sweep_loop(
    members: Vec<Arc<dyn ManagedCache>>,
    period: Duration,
    start_immediately: bool,
    cancel: CancellationToken,
) {
    let start = if start_immediately { Instant::now() } else { Instant::now() + period };
    let mut ticker = time::interval_at(start, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {
                for cache in &members {
                    trace!(cache = cache.cache_name(), "Running expiration sweep");
                    cache.clear_expired();
                }
            }
        }
    }
}
