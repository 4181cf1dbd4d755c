// ==============================================
// CONSTRAINED CACHE CONCURRENCY TESTS (integration)
// ==============================================
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

use rand::Rng;
use sourcecache::builder::ConstrainedCacheBuilder;
use sourcecache::clock::ManualClock;
use sourcecache::ds::ThreadingPrecision;
use sourcecache::policy::constrained::ConstrainedCache;
use sourcecache::policy::event_counting::CleanupMode;
use sourcecache::traits::Ordinal;

type ByteCache = ConstrainedCache<Ordinal<u64>, Vec<u8>>;

const DEADLINE: Duration = Duration::from_secs(30);

fn byte_cache(max_bytes: usize, precision: ThreadingPrecision) -> ByteCache {
    ConstrainedCacheBuilder::new(Ordinal::new())
        .size_calculator(|_: &u64, value: &Vec<u8>| value.len())
        .max_bytes(max_bytes)
        .usage_window(Duration::from_secs(60))
        .min_cleanup_interval(Duration::from_millis(5))
        .threading_precision(precision)
        .build()
}

/// Runs `work` on `threads` threads released together; fails instead of
/// hanging if any thread does not finish before the deadline.
fn run_bounded<F>(threads: usize, work: F)
where
    F: Fn(usize) + Send + Sync + 'static,
{
    let work = Arc::new(work);
    let barrier = Arc::new(Barrier::new(threads));
    let (done_tx, done_rx) = mpsc::channel();
    let handles: Vec<_> = (0..threads)
        .map(|thread_id| {
            let work = Arc::clone(&work);
            let barrier = Arc::clone(&barrier);
            let done_tx = done_tx.clone();
            thread::spawn(move || {
                barrier.wait();
                work(thread_id);
                let _ = done_tx.send(thread_id);
            })
        })
        .collect();
    drop(done_tx);

    for _ in 0..threads {
        done_rx
            .recv_timeout(DEADLINE)
            .expect("worker did not finish in time (deadlock?)");
    }
    for handle in handles {
        handle.join().unwrap();
    }
}

mod distinct_keys {
    use super::*;

    #[test]
    fn all_sets_retrievable_under_budget() {
        const THREADS: usize = 16;
        const PER_THREAD: u64 = 200;

        let cache = byte_cache(0, ThreadingPrecision::Accurate);
        let shared = cache.clone();
        run_bounded(THREADS, move |thread_id| {
            for i in 0..PER_THREAD {
                let key = thread_id as u64 * PER_THREAD + i;
                shared.set(&key, key.to_le_bytes().to_vec());
            }
        });

        assert_eq!(cache.len(), THREADS * PER_THREAD as usize);
        for key in 0..THREADS as u64 * PER_THREAD {
            let value = cache.get(&key).unwrap_or_else(|| panic!("lost key {}", key));
            assert_eq!(value.as_slice(), key.to_le_bytes());
        }
        cache.check_invariants().unwrap();
    }

    #[test]
    fn one_key_per_thread_with_fast_precision() {
        const THREADS: usize = 32;

        let cache = byte_cache(1 << 20, ThreadingPrecision::Fast);
        let shared = cache.clone();
        run_bounded(THREADS, move |thread_id| {
            shared.set(&(thread_id as u64), vec![thread_id as u8; 64]);
        });

        for key in 0..THREADS as u64 {
            assert_eq!(cache.get(&key).unwrap()[0], key as u8);
        }
    }
}

mod contention {
    use super::*;

    #[test]
    fn same_key_last_writer_wins() {
        const THREADS: usize = 8;

        let cache = byte_cache(0, ThreadingPrecision::Accurate);
        let shared = cache.clone();
        run_bounded(THREADS, move |thread_id| {
            for round in 0..100usize {
                shared.set(&0, vec![thread_id as u8; 1 + (round % 7)]);
            }
        });

        let value = cache.get(&0).unwrap();
        assert!((1..=7).contains(&value.len()));
        assert_eq!(cache.len(), 1);
        // delta accounting never drifts under overwrite races
        cache.check_invariants().unwrap();
    }

    #[test]
    fn mixed_ops_under_pressure_stay_bounded() {
        const THREADS: usize = 8;
        const OPS: usize = 2_000;
        const MAX: usize = 64 * 1024;

        let cache = byte_cache(MAX, ThreadingPrecision::Fast);
        let hits = Arc::new(AtomicUsize::new(0));
        let shared = cache.clone();
        let hit_count = Arc::clone(&hits);
        run_bounded(THREADS, move |_| {
            let mut rng = rand::thread_rng();
            for _ in 0..OPS {
                let key = rng.gen_range(0..512u64);
                match rng.gen_range(0..10) {
                    0..=4 => {
                        if shared.get(&key).is_some() {
                            hit_count.fetch_add(1, Ordering::Relaxed);
                        }
                    },
                    5..=7 => shared.set(&key, vec![0u8; rng.gen_range(16..512)]),
                    8 => {
                        shared.remove(&key);
                    },
                    _ => {
                        shared.cleanup(CleanupMode::Maintenance);
                        shared.ping_cleanup();
                    },
                }
            }
        });

        // a MakeRoom that lost the guard to a concurrent pass leaves the
        // overshoot for the next writer; settle it once workers are done
        let deadline = Instant::now() + DEADLINE;
        while !cache.cleanup(CleanupMode::MakeRoom) {
            assert!(Instant::now() < deadline, "cleanup guard never released");
            thread::yield_now();
        }
        assert!(cache.bytes_used() <= MAX);
        assert!(hits.load(Ordering::Relaxed) > 0);
        for key in 0..512u64 {
            if let Some(value) = cache.get(&key) {
                assert!(value.len() >= 16);
            }
        }
    }

    #[test]
    fn set_racing_maintenance_keeps_value() {
        const KEYS: u64 = 2_000;
        const WINDOW: Duration = Duration::from_secs(60);

        let clock = Arc::new(ManualClock::new());
        let cache: ByteCache = ConstrainedCacheBuilder::new(Ordinal::new())
            .size_calculator(|_: &u64, value: &Vec<u8>| value.len())
            .usage_window(WINDOW)
            .min_cleanup_interval(Duration::from_secs(3600))
            .threading_precision(ThreadingPrecision::Accurate)
            .clock(clock.clone())
            .build();
        for key in 0..KEYS {
            cache.set(&key, vec![1u8; 8]);
        }
        // every counter is now idle and a maintenance candidate
        clock.advance(WINDOW * 2);

        let lost = Arc::new(AtomicUsize::new(0));
        let writing = Arc::new(AtomicBool::new(true));
        let shared = cache.clone();
        let lost_count = Arc::clone(&lost);
        run_bounded(2, move |thread_id| {
            if thread_id == 0 {
                for key in 0..KEYS {
                    shared.set(&key, vec![2u8; 8]);
                    if shared.get(&key).map(|v| v[0]) != Some(2) {
                        lost_count.fetch_add(1, Ordering::Relaxed);
                    }
                }
                writing.store(false, Ordering::Release);
            } else {
                while writing.load(Ordering::Acquire) {
                    shared.cleanup(CleanupMode::Maintenance);
                }
            }
        });

        assert_eq!(lost.load(Ordering::Relaxed), 0);
        cache.check_invariants().unwrap();
    }

    #[test]
    fn concurrent_make_room_collapses_without_deadlock() {
        const THREADS: usize = 12;

        let cache = byte_cache(8 * 1024, ThreadingPrecision::Accurate);
        let shared = cache.clone();
        run_bounded(THREADS, move |thread_id| {
            for i in 0..300u64 {
                let key = (thread_id as u64) << 32 | i;
                shared.set(&key, vec![1u8; 100]);
                shared.get(&key);
            }
        });
        assert!(!cache.is_empty());
    }
}
