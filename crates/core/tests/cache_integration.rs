//! Cache operation integration tests
//!
//! Drives caches obtained from a running manager: eviction policies, event
//! delivery, statistics and the async operation twins.

mod support;

use std::sync::Arc;

use memcache_core::{
    CacheEntryEvent, CacheEntryEventListener, CacheManager, Configuration, EventType,
    EvictionPolicy, Lifecycle, ListenerRef, MemCache,
};
use support::{builder, eternal, recorder, Observed};

fn running(configuration: Configuration) -> anyhow::Result<CacheManager> {
    let manager = CacheManager::with_configuration(configuration);
    manager.initialize()?;
    Ok(manager)
}

fn single<V: memcache_core::CacheValue>(
    manager: &CacheManager,
    name: &str,
) -> anyhow::Result<MemCache<u32, V>> {
    manager
        .get_cache::<u32, V>(name)?
        .ok_or_else(|| anyhow::anyhow!("cache '{name}' missing"))
}

/// Validates FIFO and LIFO capacity enforcement with two slots.
///
/// # Test Steps
/// 1. Configure a FIFO and a LIFO cache, each holding two entries
/// 2. Insert keys 1, 2, 3 into both
/// 3. Verify FIFO kept {2, 3} and LIFO kept {1, 3}
#[test]
fn test_insertion_order_policies() -> anyhow::Result<()> {
    let manager = running(
        Configuration::builder()
            .cache(eternal::<u32, String>("fifo", EvictionPolicy::Fifo, 2))
            .cache(eternal::<u32, String>("lifo", EvictionPolicy::Lifo, 2))
            .build()?,
    )?;

    for name in ["fifo", "lifo"] {
        let cache = single::<String>(&manager, name)?;
        for key in 1..=3 {
            cache.put(key, format!("v{key}"));
        }
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.statistics().evictions(), 1);
    }

    let fifo = single::<String>(&manager, "fifo")?;
    assert_eq!(fifo.get(&1), None);
    assert!(fifo.get(&2).is_some() && fifo.get(&3).is_some());

    let lifo = single::<String>(&manager, "lifo")?;
    assert_eq!(lifo.get(&2), None);
    assert!(lifo.get(&1).is_some() && lifo.get(&3).is_some());

    manager.shutdown()?;
    Ok(())
}

/// Validates event delivery to configured and runtime-registered listeners.
///
/// # Test Steps
/// 1. Configure a cache with one listener and register a second one later
/// 2. put(1,"a"), put(1,"b"), remove(1), then clear()
/// 3. Verify both saw ADDED, UPDATED, REMOVED and one batch REMOVED
/// 4. Deregister the second listener and verify it receives nothing more
#[test]
fn test_event_delivery() -> anyhow::Result<()> {
    let configured = recorder::<u32, String>();
    let config = builder::<u32, String>("events", EvictionPolicy::Lru, 10)
        .listener(Arc::clone(&configured) as ListenerRef<u32, String>)
        .build()?;
    let manager = running(Configuration::builder().cache(config).build()?)?;
    let cache = single::<String>(&manager, "events")?;

    let late = recorder::<u32, String>();
    let late_ref: ListenerRef<u32, String> = Arc::clone(&late) as ListenerRef<u32, String>;
    assert!(cache.register_event_listener(Arc::clone(&late_ref))?);
    assert!(!cache.register_event_listener(Arc::clone(&late_ref))?);

    cache.put(1, "a".into());
    cache.put(1, "b".into());
    cache.remove(&1);
    cache.clear();

    let expected = vec![
        Observed { event_type: EventType::Added, key: 1, old_value: None, new_value: Some("a".to_string()) },
        Observed {
            event_type: EventType::Updated,
            key: 1,
            old_value: Some("a".to_string()),
            new_value: Some("b".to_string()),
        },
        Observed { event_type: EventType::Removed, key: 1, old_value: Some("b".to_string()), new_value: None },
    ];
    for listener in [&configured, &late] {
        assert_eq!(listener.events(), expected);
        assert_eq!(listener.batches(), vec![("events".to_string(), EventType::Removed)]);
    }

    assert!(cache.deregister_event_listener(&late_ref)?);
    cache.put(2, "c".into());
    assert_eq!(late.events().len(), 3);
    assert_eq!(configured.count(EventType::Added), 2);

    manager.shutdown()?;
    Ok(())
}

/// Validates that a panicking listener does not break the operation or
/// delivery to later listeners.
#[test]
fn test_panicking_listener_is_isolated() -> anyhow::Result<()> {
    struct Exploding;
    impl CacheEntryEventListener<u32, String> for Exploding {
        fn on_event(&self, _event: &CacheEntryEvent<u32, String>) {
            panic!("listener bug");
        }
    }

    let after = recorder::<u32, String>();
    let config = builder::<u32, String>("fragile", EvictionPolicy::Lfu, 10)
        .listener(Arc::new(Exploding))
        .listener(Arc::clone(&after) as ListenerRef<u32, String>)
        .build()?;
    let manager = running(Configuration::builder().cache(config).build()?)?;
    let cache = single::<String>(&manager, "fragile")?;

    assert_eq!(cache.put(7, "x".into()), None);
    assert_eq!(cache.get(&7).as_deref(), Some("x"));
    assert_eq!(after.count(EventType::Added), 1);

    manager.shutdown()?;
    Ok(())
}

/// Validates statistics accounting, snapshots and the enable gate.
///
/// Assertions:
/// - One put, one hit, one miss and one removal give approximate hits of
///   three and misses of one.
/// - Disabled statistics stop counting; re-enabling resumes without reset.
/// - `reset` zeroes every counter.
#[test]
fn test_statistics() -> anyhow::Result<()> {
    let manager =
        running(Configuration::builder().cache(eternal::<u32, String>("stats", EvictionPolicy::Lru, 8)).build()?)?;
    let cache = single::<String>(&manager, "stats")?;

    cache.put(1, "a".into());
    cache.get(&1);
    cache.get(&2);
    cache.remove(&1);

    let stats = cache.statistics();
    assert_eq!(stats.put_hits(), 1);
    assert_eq!(stats.read_only_retrieval_hits(), 1);
    assert_eq!(stats.read_only_retrieval_misses(), 1);
    assert_eq!(stats.removal_hits(), 1);
    assert_eq!(stats.approximate_hits_count(), 3);
    assert_eq!(stats.approximate_misses_count(), 1);

    let snapshot = stats.snapshot();
    assert!(snapshot.enabled);
    assert!((snapshot.read_hit_rate() - 0.5).abs() < f64::EPSILON);
    let json = serde_json::to_value(&snapshot)?;
    assert_eq!(json["put_hits"], 1);

    stats.set_enabled(false);
    cache.put(2, "b".into());
    assert_eq!(stats.put_hits(), 1);
    assert_eq!(stats.current_entries_count(), 1);
    stats.set_enabled(true);
    cache.put(3, "c".into());
    assert_eq!(stats.put_hits(), 2);

    stats.reset();
    assert_eq!(stats.approximate_hits_count(), 0);
    assert_eq!(stats.approximate_misses_count(), 0);

    manager.shutdown()?;
    Ok(())
}

/// Validates the async twins on the manager's async pool.
///
/// # Test Steps
/// 1. Run put/get/merge/remove through the async API
/// 2. Verify results match the synchronous semantics
/// 3. Shut the manager down and verify async calls are rejected
#[tokio::test(flavor = "multi_thread")]
async fn test_async_operations() -> anyhow::Result<()> {
    let manager = running(
        Configuration::builder()
            .cache(eternal::<u32, String>("async", EvictionPolicy::Mru, 8))
            .async_parallelism(2)
            .build()?,
    )?;
    let cache = single::<String>(&manager, "async")?;

    assert_eq!(cache.put_async(1, "a".into()).await?, None);
    assert_eq!(cache.get_async(1).await?.as_deref(), Some("a"));
    assert_eq!(
        cache.merge_async(1, "b".into(), |old, new| Some(format!("{old}+{new}"))).await?.as_deref(),
        Some("a+b")
    );
    assert!(!cache.replace_async(1, Some("zzz".into()), None).await?);
    assert_eq!(cache.remove_async(1).await?.as_deref(), Some("a+b"));

    let pending: Vec<_> = (10..20).map(|k| cache.put_async(k, k.to_string())).collect();
    for outcome in futures::future::join_all(pending).await {
        assert_eq!(outcome?, None);
    }
    assert!(cache.len() <= 8);

    manager.shutdown()?;
    assert!(cache.get_async(10).await.is_err());
    Ok(())
}
