//! Entry change notifications.
//!
//! Listeners are invoked synchronously on the thread performing the
//! mutation, in registration order. Each invocation is isolated: a panicking
//! listener is logged and skipped, later listeners still run and the
//! triggering cache operation still succeeds.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::error;

/// Kind of change an event describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    /// A key was inserted
    Added,
    /// An existing key received a different value
    Updated,
    /// A key was removed explicitly, by eviction or by `clear`
    Removed,
    /// A key was removed by the expiration sweep
    Expired,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Added => write!(f, "ADDED"),
            Self::Updated => write!(f, "UPDATED"),
            Self::Removed => write!(f, "REMOVED"),
            Self::Expired => write!(f, "EXPIRED"),
        }
    }
}

/// Change of a single key
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntryEvent<K, V> {
    cache_name: Arc<str>,
    key: K,
    old_value: Option<V>,
    new_value: Option<V>,
    event_type: EventType,
}

impl<K, V> CacheEntryEvent<K, V> {
    pub(crate) fn new(
        cache_name: Arc<str>,
        key: K,
        old_value: Option<V>,
        new_value: Option<V>,
        event_type: EventType,
    ) -> Self {
        Self { cache_name, key, old_value, new_value, event_type }
    }

    /// Name of the cache that changed
    pub fn cache_name(&self) -> &str {
        &self.cache_name
    }

    /// Changed key
    pub const fn key(&self) -> &K {
        &self.key
    }

    /// Value before the change (`None` for `Added`)
    pub const fn old_value(&self) -> Option<&V> {
        self.old_value.as_ref()
    }

    /// Value after the change (`None` for `Removed` and `Expired`)
    pub const fn new_value(&self) -> Option<&V> {
        self.new_value.as_ref()
    }

    /// Kind of change
    pub const fn event_type(&self) -> EventType {
        self.event_type
    }
}

/// Change affecting many keys at once (currently only `clear`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntriesEvent {
    cache_name: Arc<str>,
    event_type: EventType,
}

impl CacheEntriesEvent {
    pub(crate) fn new(cache_name: Arc<str>, event_type: EventType) -> Self {
        Self { cache_name, event_type }
    }

    /// Name of the cache that changed
    pub fn cache_name(&self) -> &str {
        &self.cache_name
    }

    /// Kind of change
    pub const fn event_type(&self) -> EventType {
        self.event_type
    }
}

/// Receiver of cache change notifications
pub trait CacheEntryEventListener<K, V>: Send + Sync {
    /// Called once per single-key change
    fn on_event(&self, event: &CacheEntryEvent<K, V>);

    /// Called once per batch change
    fn on_batch_event(&self, _event: &CacheEntriesEvent) {}
}

/// Shared listener handle
pub type ListenerRef<K, V> = Arc<dyn CacheEntryEventListener<K, V>>;

/// Copy-on-write listener list
///
/// Registration is rare and delivery is on every mutation, so delivery works
/// on a snapshot and never holds the lock while calling out.
pub(crate) struct ListenerRegistry<K, V> {
    cache_name: Arc<str>,
    listeners: RwLock<Arc<Vec<ListenerRef<K, V>>>>,
}

impl<K, V> ListenerRegistry<K, V> {
    pub(crate) fn new(cache_name: Arc<str>) -> Self {
        Self { cache_name, listeners: RwLock::new(Arc::new(Vec::new())) }
    }

    /// Add `listener` unless the same instance is already registered.
    pub(crate) fn register(&self, listener: ListenerRef<K, V>) -> bool {
        let mut guard = self.listeners.write();
        if guard.iter().any(|existing| same_listener(existing, &listener)) {
            return false;
        }
        let mut next = Vec::with_capacity(guard.len() + 1);
        next.extend(guard.iter().cloned());
        next.push(listener);
        *guard = Arc::new(next);
        true
    }

    pub(crate) fn deregister(&self, listener: &ListenerRef<K, V>) -> bool {
        let mut guard = self.listeners.write();
        if !guard.iter().any(|existing| same_listener(existing, listener)) {
            return false;
        }
        let next =
            guard.iter().filter(|existing| !same_listener(existing, listener)).cloned().collect();
        *guard = Arc::new(next);
        true
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.listeners.read().len()
    }

    fn snapshot(&self) -> Arc<Vec<ListenerRef<K, V>>> {
        Arc::clone(&self.listeners.read())
    }

    pub(crate) fn notify(&self, event: &CacheEntryEvent<K, V>) {
        for (index, listener) in self.snapshot().iter().enumerate() {
            let outcome = catch_unwind(AssertUnwindSafe(|| listener.on_event(event)));
            if let Err(payload) = outcome {
                self.log_panic(index, event.event_type(), payload.as_ref());
            }
        }
    }

    pub(crate) fn notify_batch(&self, event: &CacheEntriesEvent) {
        for (index, listener) in self.snapshot().iter().enumerate() {
            let outcome = catch_unwind(AssertUnwindSafe(|| listener.on_batch_event(event)));
            if let Err(payload) = outcome {
                self.log_panic(index, event.event_type(), payload.as_ref());
            }
        }
    }

    fn log_panic(&self, index: usize, event_type: EventType, payload: &(dyn std::any::Any + Send)) {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_default();
        error!(
            cache = %self.cache_name,
            listener = index,
            event = %event_type,
            panic = %message,
            "Cache event listener panicked; continuing delivery"
        );
    }
}

fn same_listener<K, V>(a: &ListenerRef<K, V>, b: &ListenerRef<K, V>) -> bool {
    // Compare data pointers only; vtable pointers may differ across codegen units.
    std::ptr::eq(Arc::as_ptr(a).cast::<()>(), Arc::as_ptr(b).cast::<()>())
}
