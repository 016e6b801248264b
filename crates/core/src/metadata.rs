//! Per-entry eviction and expiration bookkeeping.
//!
//! Each policy ranks entries with a [`RankKey`]; the smallest key is the next
//! eviction victim. Ranks are unique per cache because the tie-breaker is
//! drawn from a per-cache monotonic counter.

use std::fmt;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use memcache_common::time::Clock;

use crate::config::{EvictionPolicy, ExpirationConfiguration};

/// Position of an entry in the ranked eviction index
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RankKey {
    primary: i128,
    tie: u64,
}

/// Policy-specific state
#[derive(Debug)]
pub enum PolicyState {
    /// Least recently used first
    Lru,
    /// Most recently used first
    Mru,
    /// Least frequently used first
    Lfu {
        /// Number of reads since creation (or restore)
        usage: AtomicU64,
    },
    /// Oldest insertion first
    Fifo,
    /// Newest insertion first
    Lifo,
}

/// Bookkeeping for one live entry
pub struct EntryMetadata<K> {
    key: K,
    sequence: u64,
    expired_by_lifespan_at: i64,
    last_accessed: AtomicI64,
    access_stamp: AtomicU64,
    policy: PolicyState,
}

impl<K: fmt::Debug> fmt::Debug for EntryMetadata<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntryMetadata")
            .field("key", &self.key)
            .field("sequence", &self.sequence)
            .field("expired_by_lifespan_at", &self.expired_by_lifespan_at)
            .field("last_accessed", &self.last_accessed())
            .field("policy", &self.policy)
            .finish()
    }
}

impl<K> EntryMetadata<K> {
    /// Key this metadata belongs to
    pub const fn key(&self) -> &K {
        &self.key
    }

    /// Absolute lifespan deadline in ms, `i64::MAX` when lifespan is disabled
    pub const fn expired_by_lifespan_at(&self) -> i64 {
        self.expired_by_lifespan_at
    }

    /// Last read or write in ms since the epoch
    pub fn last_accessed(&self) -> i64 {
        self.last_accessed.load(Ordering::Acquire)
    }

    /// Read counter for LFU entries
    pub fn usage_count(&self) -> Option<u64> {
        match &self.policy {
            PolicyState::Lfu { usage } => Some(usage.load(Ordering::Acquire)),
            _ => None,
        }
    }

    /// Policy variant
    pub const fn policy(&self) -> &PolicyState {
        &self.policy
    }

    /// Whether `on_usage` changes this entry's rank
    pub const fn rank_follows_usage(&self) -> bool {
        matches!(self.policy, PolicyState::Lru | PolicyState::Mru | PolicyState::Lfu { .. })
    }

    /// Current rank. Must be read under the index lock when
    /// [`rank_follows_usage`](Self::rank_follows_usage) is true.
    pub fn rank(&self) -> RankKey {
        let stamp = self.access_stamp.load(Ordering::Acquire);
        match &self.policy {
            PolicyState::Lru => RankKey { primary: i128::from(self.last_accessed()), tie: stamp },
            PolicyState::Mru => {
                RankKey { primary: -i128::from(self.last_accessed()), tie: u64::MAX - stamp }
            }
            PolicyState::Lfu { usage } => {
                RankKey { primary: i128::from(usage.load(Ordering::Acquire)), tie: stamp }
            }
            PolicyState::Fifo => {
                RankKey { primary: i128::from(self.expired_by_lifespan_at), tie: self.sequence }
            }
            PolicyState::Lifo => RankKey {
                primary: -i128::from(self.expired_by_lifespan_at),
                tie: u64::MAX - self.sequence,
            },
        }
    }

    /// Record a read or write at `now` with a fresh access `stamp`.
    pub(crate) fn on_usage(&self, now: i64, stamp: u64) {
        self.last_accessed.fetch_max(now, Ordering::AcqRel);
        self.access_stamp.store(stamp, Ordering::Release);
        if let PolicyState::Lfu { usage } = &self.policy {
            usage.fetch_add(1, Ordering::AcqRel);
        }
    }

    /// Whether the lifespan deadline or idle timeout has passed at `now`.
    pub fn is_expired(&self, now: i64, idle_timeout: i64) -> bool {
        self.remaining(now, idle_timeout) <= 0
    }

    /// Milliseconds until the earlier of the two expiry conditions.
    pub(crate) fn remaining(&self, now: i64, idle_timeout: i64) -> i64 {
        let by_lifespan = self.expired_by_lifespan_at.saturating_sub(now);
        if idle_timeout > 0 {
            let by_idle = self.last_accessed().saturating_add(idle_timeout).saturating_sub(now);
            by_lifespan.min(by_idle)
        } else {
            by_lifespan
        }
    }
}

/// Creates metadata of the cache's policy
pub struct EntryMetadataFactory {
    policy: EvictionPolicy,
    lifespan: i64,
    clock: Arc<dyn Clock>,
    sequence: AtomicU64,
}

impl fmt::Debug for EntryMetadataFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntryMetadataFactory")
            .field("policy", &self.policy)
            .field("lifespan", &self.lifespan)
            .finish_non_exhaustive()
    }
}

impl EntryMetadataFactory {
    /// Factory for `policy` with deadlines from `expiration`
    pub fn new(
        policy: EvictionPolicy,
        expiration: &ExpirationConfiguration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { policy, lifespan: expiration.lifespan(), clock, sequence: AtomicU64::new(0) }
    }

    /// Eviction policy
    pub const fn policy(&self) -> EvictionPolicy {
        self.policy
    }

    /// Current time of the factory's clock
    pub fn now(&self) -> i64 {
        self.clock.now_millis()
    }

    /// Next value of the per-cache access counter
    pub(crate) fn next_stamp(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::Relaxed)
    }

    /// Metadata for a freshly inserted key
    pub fn create<K>(&self, key: K) -> EntryMetadata<K> {
        let now = self.now();
        self.build(key, now, now, 0)
    }

    /// Metadata for an entry restored from a snapshot
    pub fn restore<K>(&self, key: K, last_accessed: i64, usage: u64) -> EntryMetadata<K> {
        let now = self.now();
        self.build(key, now, last_accessed.min(now), usage)
    }

    fn build<K>(&self, key: K, now: i64, last_accessed: i64, usage: u64) -> EntryMetadata<K> {
        let expired_by_lifespan_at =
            if self.lifespan > 0 { now.saturating_add(self.lifespan) } else { i64::MAX };
        let sequence = self.next_stamp();
        let policy = match self.policy {
            EvictionPolicy::Lru => PolicyState::Lru,
            EvictionPolicy::Mru => PolicyState::Mru,
            EvictionPolicy::Lfu => PolicyState::Lfu { usage: AtomicU64::new(usage) },
            EvictionPolicy::Fifo => PolicyState::Fifo,
            EvictionPolicy::Lifo => PolicyState::Lifo,
        };
        EntryMetadata {
            key,
            sequence,
            expired_by_lifespan_at,
            last_accessed: AtomicI64::new(last_accessed),
            access_stamp: AtomicU64::new(sequence),
            policy,
        }
    }
}
