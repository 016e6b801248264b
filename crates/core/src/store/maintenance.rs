//! Capacity eviction, expiration sweeps and bulk clearing.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use memcache_common::lifecycle::ComponentStatus;
use tracing::{debug, trace};

use super::{MemCache, Remap};
use crate::entry::{CacheKey, CacheValue};
use crate::events::{CacheEntriesEvent, EventType};
use crate::metadata::EntryMetadata;

impl<K: CacheKey, V: CacheValue> MemCache<K, V> {
    /// Remove every entry and notify each listener with one batch event.
    ///
    /// Not atomic with respect to concurrent writers: entries written to a
    /// segment after it was cleared survive.
    pub fn clear(&self) {
        let inner = &*self.inner;
        debug!(cache = %inner.name, entries = self.len(), "Clearing cache");

        inner.segments.clear(|entry| {
            inner.index.remove(entry.metadata());
        });
        inner.listeners.notify_batch(&CacheEntriesEvent::new(
            Arc::clone(&inner.name),
            EventType::Removed,
        ));
    }

    /// Remove entries whose lifespan or idle timeout has elapsed.
    ///
    /// Runs only while the cache is running, is skipped until the nearest
    /// known expiration time, and is skipped when another sweep of the same
    /// cache is in progress.
    pub fn clear_expired(&self) {
        let inner = &*self.inner;
        let expiration = inner.config.expiration();
        if expiration.is_eternal() || inner.status.get() != ComponentStatus::Running {
            return;
        }
        if inner.nearest_expiration.load(Ordering::Acquire) > inner.clock.now_millis() {
            return;
        }
        let Some(_sweep) = inner.sweep_lock.try_lock() else {
            trace!(cache = %inner.name, "Sweep already in progress");
            return;
        };

        let now = inner.clock.now_millis();
        if inner.nearest_expiration.load(Ordering::Acquire) > now {
            return;
        }

        let idle_timeout = expiration.idle_timeout();
        let mut nearest = expiration
            .shortest_interval()
            .map_or(i64::MAX, |interval| i64::try_from(interval.as_millis()).unwrap_or(i64::MAX));
        let mut expired = 0usize;

        for metadata in inner.index.snapshot() {
            let remaining = metadata.remaining(now, idle_timeout);
            if remaining > 0 {
                nearest = nearest.min(remaining);
            } else if self.delete_ranked(&metadata, EventType::Expired) {
                inner.statistics.record_expiration();
                expired += 1;
            }
        }

        inner.nearest_expiration.store(now.saturating_add(nearest), Ordering::Release);
        if expired > 0 {
            debug!(cache = %inner.name, expired, remaining = self.len(), "Expired entries removed");
        } else {
            trace!(cache = %inner.name, "No expired entries");
        }
    }

    /// Evict by policy until the index is back within `max_entries`.
    ///
    /// `inserted` is the key whose insertion caused the overflow; it is never
    /// chosen as a victim.
    pub(crate) fn enforce_capacity(&self, inserted: Option<&K>) {
        let inner = &*self.inner;
        let max_entries = inner.config.memory_store().max_entries();
        if inner.index.len() <= max_entries {
            return;
        }
        self.clear_expired();

        while inner.index.len() > max_entries {
            let Some(victim) = inner.index.first_excluding(inserted) else {
                break;
            };
            if self.delete_ranked(&victim, EventType::Removed) {
                inner.statistics.record_eviction();
                trace!(cache = %inner.name, key = ?victim.key(), "Entry evicted");
            }
        }
    }

    /// Delete the entry owning `metadata` through the compute primitive.
    ///
    /// Returns `false` when the key is now mapped to a different entry (or
    /// not at all); the stale metadata is then dropped from the index.
    fn delete_ranked(&self, metadata: &Arc<EntryMetadata<K>>, event_type: EventType) -> bool {
        let computed = self.compute_entry(metadata.key(), event_type, |_, current| match current {
            Some(entry) if Arc::ptr_eq(entry.metadata(), metadata) => Remap::Delete,
            _ => Remap::Keep,
        });
        if computed.removed() {
            true
        } else {
            self.inner.index.remove(metadata);
            false
        }
    }
}
