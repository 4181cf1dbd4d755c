// ==============================================
// EVICTION INVARIANTS (integration)
// ==============================================
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use proptest::prelude::*;
use sourcecache::builder::ConstrainedCacheBuilder;
use sourcecache::clock::ManualClock;
use sourcecache::ds::ThreadingPrecision;
use sourcecache::policy::constrained::{ConstrainedCache, ENTRY_OVERHEAD_BYTES};
use sourcecache::policy::event_counting::{
    CleanupMode, CleanupStrategy, EventCountingDictionary,
};
use sourcecache::traits::{CaseInsensitive, Ordinal};

const WINDOW: Duration = Duration::from_secs(32);
const NEVER: Duration = Duration::from_secs(24 * 3600);

fn manual_cache(max_bytes: usize) -> (ConstrainedCache<Ordinal<u32>, Vec<u8>>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new());
    let cache = ConstrainedCacheBuilder::new(Ordinal::new())
        .size_calculator(|_: &u32, value: &Vec<u8>| value.len())
        .max_bytes(max_bytes)
        .usage_window(WINDOW)
        .min_cleanup_interval(NEVER)
        .threading_precision(ThreadingPrecision::Accurate)
        .clock(clock.clone())
        .build();
    (cache, clock)
}

fn cost(cache: &ConstrainedCache<Ordinal<u32>, Vec<u8>>, payload: usize) -> usize {
    cache.counter_overhead() + payload + ENTRY_OVERHEAD_BYTES
}

mod budget {
    use super::*;

    #[test]
    fn usage_drops_to_ninety_percent_or_less_after_make_room() {
        let (probe, _) = manual_cache(0);
        let entry = cost(&probe, 200);
        let max = entry * 50;
        let (cache, _) = manual_cache(max);

        for key in 0..50 {
            cache.set(&key, vec![0; 200]);
        }
        assert_eq!(cache.len(), 50);

        cache.set(&50, vec![0; 200]);
        // freed at least a tenth of the budget, counted from the overshoot
        assert!(cache.bytes_used() <= max + entry - max / 10);
        assert!(cache.bytes_used() <= max);
        cache.check_invariants().unwrap();
    }

    #[test]
    fn evicted_keys_are_the_lowest_usage_keys() {
        let (probe, _) = manual_cache(0);
        let entry = cost(&probe, 50);
        let (cache, _) = manual_cache(entry * 20);

        for key in 0..20 {
            cache.set(&key, vec![0; 50]);
        }
        // every even key gets extra reads
        for key in (0..20).step_by(2) {
            cache.get(&key);
            cache.get(&key);
        }
        for key in 20..24 {
            cache.set(&key, vec![0; 50]);
        }

        for key in (0..20).step_by(2) {
            assert!(cache.contains(&key), "hot key {} evicted", key);
        }
        let cold_left = (1..20).step_by(2).filter(|k| cache.contains(k)).count();
        assert!(cold_left < 10);
        cache.check_invariants().unwrap();
    }

    #[test]
    fn ties_break_towards_oldest_touch() {
        let (probe, _) = manual_cache(0);
        let entry = cost(&probe, 10);
        let (cache, _) = manual_cache(entry * 10);

        for key in 0..10 {
            cache.set(&key, vec![0; 10]);
        }
        // equal counts everywhere; key 0 touched last
        for key in 1..10 {
            cache.get(&key);
        }
        cache.get(&0);
        // growing key 5 by one entry pushes the cache one entry over
        cache.set(&5, vec![0; 10 + entry]);

        assert!(cache.contains(&0));
        assert!(!cache.contains(&1));
        assert!(cache.contains(&5));
        assert_eq!(cache.len(), 9);
    }
}

mod maintenance {
    use super::*;

    #[test]
    fn idle_key_gets_one_event_then_misses() {
        let clock = Arc::new(ManualClock::new());
        let usage = EventCountingDictionary::try_with_clock(
            CaseInsensitive,
            WINDOW,
            CleanupStrategy {
                minimum_cleanup_interval: NEVER,
                ..CleanupStrategy::default()
            },
            clock.clone(),
        )
        .unwrap();
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        usage.subscribe(move |key: &String, value: u64| sink.lock().push((key.clone(), value)));

        usage.increment("/Idle.png", 100);
        usage.increment("/busy.png", 100);
        clock.advance(WINDOW / 2);
        usage.increment("/busy.png", 0);
        clock.advance(WINDOW / 2 + Duration::from_secs(1));

        assert_eq!(usage.value("/idle.png"), 0);
        assert!(usage.cleanup(CleanupMode::Maintenance));
        assert!(usage.cleanup(CleanupMode::Maintenance));

        assert_eq!(*events.lock(), vec![("/idle.png".to_string(), 0)]);
        assert!(usage.contains("/BUSY.png"));
        usage.check_invariants().unwrap();
    }

    #[test]
    fn cache_miss_follows_maintenance() {
        let (cache, clock) = manual_cache(0);
        cache.set(&1, vec![1; 8]);
        clock.advance(WINDOW + Duration::from_secs(1));
        assert_eq!(cache.usage_count(&1), 0);
        cache.cleanup(CleanupMode::Maintenance);
        assert!(cache.get(&1).is_none());
        assert_eq!(cache.bytes_used(), 0);
    }

    #[test]
    fn cleanup_without_pressure_keeps_everything() {
        let (cache, _) = manual_cache(1 << 20);
        for key in 0..10 {
            cache.set(&key, vec![0; 8]);
        }
        assert!(cache.cleanup(CleanupMode::MakeRoom));
        assert!(cache.cleanup(CleanupMode::Maintenance));
        assert_eq!(cache.len(), 10);
    }
}

proptest! {
    /// Below the budget nothing is ever evicted and reads see the last write.
    #[test]
    fn prop_under_budget_reads_latest(
        writes in prop::collection::vec((0u32..32, 1usize..64), 1..150)
    ) {
        let (cache, _) = manual_cache(0);
        let mut expected = std::collections::HashMap::new();
        for (key, len) in writes {
            cache.set(&key, vec![key as u8; len]);
            expected.insert(key, len);
        }
        for (key, len) in expected {
            let value = cache.get(&key);
            prop_assert_eq!(value.map(|v| v.len()), Some(len));
        }
        prop_assert!(cache.check_invariants().is_ok());
    }

    /// Over any write sequence the budget holds and values match counters.
    #[test]
    fn prop_budget_always_respected(
        writes in prop::collection::vec((0u32..64, 1usize..400), 1..200),
        budget_entries in 1usize..16
    ) {
        let (probe, _) = manual_cache(0);
        let max = budget_entries * cost(&probe, 200);
        let (cache, clock) = manual_cache(max);
        for (i, (key, len)) in writes.into_iter().enumerate() {
            cache.set(&key, vec![0u8; len]);
            if i % 17 == 0 {
                clock.advance(Duration::from_secs(5));
                cache.get(&key);
            }
            prop_assert!(cache.bytes_used() <= max);
            prop_assert!(cache.check_invariants().is_ok());
        }
    }
}
