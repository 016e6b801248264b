//! Per-cache statistics
//!
//! Counters are independent atomics. Derived totals are computed from
//! separate loads without a snapshot barrier and are therefore approximate
//! under concurrent traffic.

use std::fmt;
use std::hint;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::Serialize;

type EntriesCounter = Box<dyn Fn() -> usize + Send + Sync>;

/// Statistics collected by one cache
pub struct CacheStatistics {
    enabled: AtomicBool,
    reset_in_progress: AtomicBool,
    reset_lock: Mutex<()>,
    read_only_retrieval_hits: AtomicU64,
    read_only_retrieval_misses: AtomicU64,
    put_hits: AtomicU64,
    put_misses: AtomicU64,
    removal_hits: AtomicU64,
    removal_misses: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
    entries: EntriesCounter,
}

impl fmt::Debug for CacheStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheStatistics").field("snapshot", &self.snapshot()).finish()
    }
}

/// Point-in-time copy of [`CacheStatistics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatisticsSnapshot {
    /// Whether collection is enabled
    pub enabled: bool,
    /// `get` calls that found a value
    pub read_only_retrieval_hits: u64,
    /// `get` calls that found nothing
    pub read_only_retrieval_misses: u64,
    /// Writes that stored a value
    pub put_hits: u64,
    /// Writes that stored nothing
    pub put_misses: u64,
    /// Removals that removed a value
    pub removal_hits: u64,
    /// Removals that found nothing to remove
    pub removal_misses: u64,
    /// Entries evicted by capacity
    pub evictions: u64,
    /// Entries removed by the expiration sweep
    pub expirations: u64,
    /// Live entries
    pub current_entries: usize,
}

impl StatisticsSnapshot {
    /// Read hits over read attempts, 0.0 without reads
    pub fn read_hit_rate(&self) -> f64 {
        let total = self.read_only_retrieval_hits + self.read_only_retrieval_misses;
        if total == 0 {
            0.0
        } else {
            self.read_only_retrieval_hits as f64 / total as f64
        }
    }
}

macro_rules! counter_ops {
    ($($field:ident => $record:ident),* $(,)?) => {
        $(
            pub(crate) fn $record(&self) {
                self.increment(&self.$field);
            }

            #[doc = concat!("Current `", stringify!($field), "` count")]
            pub fn $field(&self) -> u64 {
                self.$field.load(Ordering::Relaxed)
            }
        )*
    };
}

impl CacheStatistics {
    /// Enabled statistics whose entry count is provided by `entries`
    pub(crate) fn new(entries: impl Fn() -> usize + Send + Sync + 'static) -> Self {
        Self {
            enabled: AtomicBool::new(true),
            reset_in_progress: AtomicBool::new(false),
            reset_lock: Mutex::new(()),
            read_only_retrieval_hits: AtomicU64::new(0),
            read_only_retrieval_misses: AtomicU64::new(0),
            put_hits: AtomicU64::new(0),
            put_misses: AtomicU64::new(0),
            removal_hits: AtomicU64::new(0),
            removal_misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
            entries: Box::new(entries),
        }
    }

    counter_ops!(
        read_only_retrieval_hits => record_read_hit,
        read_only_retrieval_misses => record_read_miss,
        put_hits => record_put_hit,
        put_misses => record_put_miss,
        removal_hits => record_removal_hit,
        removal_misses => record_removal_miss,
        evictions => record_eviction,
        expirations => record_expiration,
    );

    fn increment(&self, counter: &AtomicU64) {
        if !self.enabled.load(Ordering::Relaxed) {
            return;
        }
        while self.reset_in_progress.load(Ordering::Acquire) {
            hint::spin_loop();
        }
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Whether counters are being collected
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Turn collection on or off; counters keep their values
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    /// Zero every counter
    pub fn reset(&self) {
        let _guard = self.reset_lock.lock();
        self.reset_in_progress.store(true, Ordering::Release);
        for counter in [
            &self.read_only_retrieval_hits,
            &self.read_only_retrieval_misses,
            &self.put_hits,
            &self.put_misses,
            &self.removal_hits,
            &self.removal_misses,
            &self.evictions,
            &self.expirations,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        self.reset_in_progress.store(false, Ordering::Release);
    }

    /// Live entries summed over all segments
    pub fn current_entries_count(&self) -> usize {
        (self.entries)()
    }

    /// Read, put and removal hits (approximate)
    pub fn approximate_hits_count(&self) -> u128 {
        u128::from(self.read_only_retrieval_hits())
            + u128::from(self.put_hits())
            + u128::from(self.removal_hits())
    }

    /// Read, put and removal misses (approximate)
    pub fn approximate_misses_count(&self) -> u128 {
        u128::from(self.read_only_retrieval_misses())
            + u128::from(self.put_misses())
            + u128::from(self.removal_misses())
    }

    /// Copy all counters
    pub fn snapshot(&self) -> StatisticsSnapshot {
        StatisticsSnapshot {
            enabled: self.is_enabled(),
            read_only_retrieval_hits: self.read_only_retrieval_hits(),
            read_only_retrieval_misses: self.read_only_retrieval_misses(),
            put_hits: self.put_hits(),
            put_misses: self.put_misses(),
            removal_hits: self.removal_hits(),
            removal_misses: self.removal_misses(),
            evictions: self.evictions(),
            expirations: self.expirations(),
            current_entries: self.current_entries_count(),
        }
    }
}
