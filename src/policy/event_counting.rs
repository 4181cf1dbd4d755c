//! # Event-Counting Dictionary
//!
//! Per-key rolling-window usage counters with a global byte budget and
//! incremental, non-blocking eviction.
//!
//! ## Architecture
//!
//! ```text
//!   ┌──────────────────────────────────────────────────────────────────────────┐
//!   │                     EventCountingDictionary<C>                           │
//!   │                                                                          │
//!   │   maps: Mutex<CounterMaps>           (short critical sections only)      │
//!   │   ┌───────────────────────────────┐  ┌───────────────────────────────┐   │
//!   │   │ by_key: Canonical → Arc<Ctr>  │  │ by_counter: counter id → key  │   │
//!   │   └───────────────────────────────┘  └───────────────────────────────┘   │
//!   │            always mutated together under the same lock                   │
//!   │                                                                          │
//!   │   bytes_used: AtomicUsize  = Σ (counter_overhead + custom_size)          │
//!   │   cleanup_guard: Mutex<()> (try_lock only; concurrent cleanups collapse) │
//!   │   last_cleanup_started: Mutex<Duration>                                  │
//!   │   listeners: RwLock<Vec<Arc<dyn CounterRemovedListener>>>                │
//!   └──────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Cleanup pass
//!
//! ```text
//!   try_lock(cleanup_guard) ── held elsewhere ──► return false
//!        │
//!        ▼
//!   MakeRoom and under budget? ──► return true
//!        │
//!        ▼
//!   lock(maps) → clone every Arc<EventCounter> → unlock
//!        │
//!        ▼
//!   rank by (value now, last touch), ascending      (no lock held)
//!        │
//!        ▼
//!   lock(maps) → walk ranked list:
//!       MakeRoom:    stop once ≥10% of budget freed and usage ≤ budget
//!       Maintenance: stop at first ranked value > 0;
//!                    skip (don't stop) counters touched since ranking
//!     remove from both maps, subtract bytes → unlock
//!        │
//!        ▼
//!   release guard → notify listeners once per removed key (no lock held)
//! ```
//!
//! Counters keep changing while the pass runs. Ranking is therefore only
//! approximately coldest-first; that is all eviction needs.
//!
//! ## Example Usage
//!
//! ```
//! use std::time::Duration;
//! use sourcecache::policy::event_counting::{CleanupStrategy, EventCountingDictionary};
//! use sourcecache::traits::Ordinal;
//!
//! let usage = EventCountingDictionary::new(
//!     Ordinal::<u32>::new(),
//!     Duration::from_secs(60),
//!     CleanupStrategy::default(),
//! );
//! usage.increment(&7, 100);
//! usage.increment(&7, 0);
//! assert_eq!(usage.value(&7), 2);
//! assert_eq!(usage.value(&8), 0);
//! assert_eq!(usage.bytes_used(), usage.counter_overhead() + 100);
//! ```

use std::fmt;
use std::mem;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use crate::clock::{Clock, MonotonicClock};
use crate::ds::event_counter::{EventCounter, ThreadingPrecision};
use crate::error::{ConfigError, InvariantError};
#[cfg(feature = "metrics")]
use crate::metrics::metrics_impl::UsageMetrics;
#[cfg(feature = "metrics")]
use crate::metrics::snapshot::UsageMetricsSnapshot;
#[cfg(feature = "metrics")]
use crate::metrics::traits::{MetricsReset, MetricsSnapshotProvider, UsageMetricsRecorder};
use crate::traits::{CounterRemovedListener, KeyComparer};

/// Upper bound on slots per counter; values are summed on every read.
pub const MAX_COUNTER_GRANULARITY: usize = 1024;

/// Shortest accepted slot (`tracking_window / counter_granularity`).
///
/// Slot epochs are 32-bit, so a counter left idle for 2^32 slots can alias
/// stale slots as live. At one millisecond that horizon is about 49 days.
pub const MIN_SLOT_DURATION: Duration = Duration::from_millis(1);

/// Why a cleanup pass runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CleanupMode {
    /// The byte budget was exceeded; evict coldest counters until back under it.
    MakeRoom,
    /// Periodic purge of counters with no activity inside the window.
    Maintenance,
}

/// Tuning knobs for counters and cleanup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CleanupStrategy {
    /// Slots per counter. Timing tolerance is `window / granularity`.
    pub counter_granularity: usize,
    /// Byte budget; `0` disables the ceiling.
    pub max_bytes_used: usize,
    /// Minimum time between background maintenance passes.
    pub minimum_cleanup_interval: Duration,
    pub threading_precision: ThreadingPrecision,
}

impl Default for CleanupStrategy {
    fn default() -> Self {
        Self {
            counter_granularity: 8,
            max_bytes_used: 0,
            minimum_cleanup_interval: Duration::from_secs(20),
            threading_precision: ThreadingPrecision::Fast,
        }
    }
}

impl CleanupStrategy {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.counter_granularity == 0 || self.counter_granularity > MAX_COUNTER_GRANULARITY {
            return Err(ConfigError::new(format!(
                "counter granularity must be in 1..={}, got {}",
                MAX_COUNTER_GRANULARITY, self.counter_granularity
            )));
        }
        if self.minimum_cleanup_interval.is_zero() {
            return Err(ConfigError::new("minimum cleanup interval must be > 0"));
        }
        Ok(())
    }
}

/// Estimated bytes one tracked key costs the tracker itself, before the
/// caller's custom size.
fn counter_overhead<K>(granularity: usize) -> usize {
    // counter + Arc header, plus one entry in each of the two maps
    EventCounter::approx_bytes(granularity)
        + 2 * mem::size_of::<usize>()
        + 2 * (mem::size_of::<K>() + mem::size_of::<u64>() + mem::size_of::<usize>())
}

struct CounterMaps<K> {
    by_key: FxHashMap<K, Arc<EventCounter>>,
    by_counter: FxHashMap<u64, K>,
}

impl<K> Default for CounterMaps<K> {
    fn default() -> Self {
        Self {
            by_key: FxHashMap::default(),
            by_counter: FxHashMap::default(),
        }
    }
}

type Listener<K> = Arc<dyn CounterRemovedListener<K>>;

struct Shared<C: KeyComparer> {
    comparer: C,
    strategy: CleanupStrategy,
    tracking_window: Duration,
    slot_duration: Duration,
    item_size: usize,
    clock: Arc<dyn Clock>,
    maps: Mutex<CounterMaps<C::Canonical>>,
    bytes_used: AtomicUsize,
    next_id: AtomicU64,
    touch_sequence: AtomicU64,
    cleanup_guard: Mutex<()>,
    last_cleanup_started: Mutex<Duration>,
    listeners: RwLock<Vec<Listener<C::Canonical>>>,
    #[cfg(feature = "metrics")]
    metrics: UsageMetrics,
}

/// Usage tracker keyed through a [`KeyComparer`].
///
/// Cloning is cheap and yields a handle to the same tracker.
pub struct EventCountingDictionary<C: KeyComparer> {
    shared: Arc<Shared<C>>,
}

impl<C: KeyComparer> Clone for EventCountingDictionary<C> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<C: KeyComparer> fmt::Debug for EventCountingDictionary<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventCountingDictionary")
            .field("len", &self.len())
            .field("bytes_used", &self.bytes_used())
            .field("tracking_window", &self.shared.tracking_window)
            .field("strategy", &self.shared.strategy)
            .finish()
    }
}

impl<C: KeyComparer> EventCountingDictionary<C> {
    /// Creates a tracker on the monotonic clock.
    ///
    /// # Panics
    ///
    /// Panics if the window or strategy is invalid; see [`try_new`](Self::try_new).
    pub fn new(comparer: C, tracking_window: Duration, strategy: CleanupStrategy) -> Self {
        match Self::try_new(comparer, tracking_window, strategy) {
            Ok(dictionary) => dictionary,
            Err(err) => panic!("{}", err),
        }
    }

    pub fn try_new(
        comparer: C,
        tracking_window: Duration,
        strategy: CleanupStrategy,
    ) -> Result<Self, ConfigError> {
        Self::try_with_clock(
            comparer,
            tracking_window,
            strategy,
            Arc::new(MonotonicClock::new()),
        )
    }

    /// Creates a tracker reading time from `clock`.
    pub fn try_with_clock(
        comparer: C,
        tracking_window: Duration,
        strategy: CleanupStrategy,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        strategy.validate()?;
        let slot_duration = tracking_window / strategy.counter_granularity as u32;
        if slot_duration < MIN_SLOT_DURATION {
            return Err(ConfigError::new(format!(
                "tracking window {:?} is too short for {} counter slots of at least {:?}",
                tracking_window, strategy.counter_granularity, MIN_SLOT_DURATION
            )));
        }
        let started = clock.now();
        Ok(Self {
            shared: Arc::new(Shared {
                comparer,
                strategy,
                tracking_window,
                slot_duration,
                item_size: counter_overhead::<C::Canonical>(strategy.counter_granularity),
                clock,
                maps: Mutex::new(CounterMaps::default()),
                bytes_used: AtomicUsize::new(0),
                next_id: AtomicU64::new(1),
                touch_sequence: AtomicU64::new(0),
                cleanup_guard: Mutex::new(()),
                last_cleanup_started: Mutex::new(started),
                listeners: RwLock::new(Vec::new()),
                #[cfg(feature = "metrics")]
                metrics: UsageMetrics::default(),
            }),
        })
    }

    /// Records a usage event for `key`, creating its counter on first touch.
    ///
    /// `custom_size` is the caller's byte cost for the entry. A new counter is
    /// charged `counter_overhead() + custom_size`; an existing counter given a
    /// non-zero size is re-charged by the difference. `0` means "touch only".
    /// May evict synchronously when the budget is exceeded.
    pub fn increment(&self, key: &C::Key, custom_size: usize) {
        let canonical = self.shared.comparer.canonicalize(key);
        self.increment_canonical(canonical, custom_size);
    }

    pub(crate) fn increment_canonical(&self, key: C::Canonical, custom_size: usize) {
        Shared::increment(&self.shared, key, custom_size, true);
    }

    /// Records a usage event only if `key` already has a counter.
    pub(crate) fn touch_canonical(&self, key: C::Canonical) -> bool {
        Shared::increment(&self.shared, key, 0, false)
    }

    /// Approximate events for `key` inside the window; `0` if untracked.
    pub fn value(&self, key: &C::Key) -> u64 {
        let canonical = self.shared.comparer.canonicalize(key);
        let counter = self.shared.maps.lock().by_key.get(&canonical).cloned();
        counter.map_or(0, |counter| counter.value_at(self.shared.clock.now()))
    }

    /// Returns `true` if `key` currently has a counter.
    pub fn contains(&self, key: &C::Key) -> bool {
        let canonical = self.shared.comparer.canonicalize(key);
        self.contains_canonical(&canonical)
    }

    pub(crate) fn contains_canonical(&self, key: &C::Canonical) -> bool {
        self.shared.maps.lock().by_key.contains_key(key)
    }

    /// Removes `key`'s counter, firing the removal event. Returns the
    /// counter's final value, or `None` if the key was untracked.
    pub fn remove(&self, key: &C::Key) -> Option<u64> {
        let canonical = self.shared.comparer.canonicalize(key);
        self.remove_canonical(&canonical)
    }

    pub(crate) fn remove_canonical(&self, key: &C::Canonical) -> Option<u64> {
        let shared = &self.shared;
        let removed = {
            let mut maps = shared.maps.lock();
            let counter = maps.by_key.remove(key)?;
            let owned_key = maps.by_counter.remove(&counter.id());
            shared.release_bytes(&counter);
            owned_key.map(|k| (k, counter.value_at(shared.clock.now())))
        };
        #[cfg(feature = "metrics")]
        shared.metrics.record_counter_removed();
        let (owned_key, value) = removed?;
        shared.notify(&[(owned_key, value)]);
        Some(value)
    }

    /// Schedules a background maintenance pass if the minimum interval has
    /// elapsed since the last pass started. Returns whether one was scheduled.
    pub fn ping_cleanup(&self) -> bool {
        Shared::ping_cleanup(&self.shared, self.shared.clock.now())
    }

    /// Runs a cleanup pass on the calling thread.
    ///
    /// Returns `false` only if another pass already held the cleanup guard.
    pub fn cleanup(&self, mode: CleanupMode) -> bool {
        self.shared.cleanup(mode)
    }

    /// Registers a listener for counter removals.
    pub fn subscribe<L>(&self, listener: L)
    where
        L: CounterRemovedListener<C::Canonical> + 'static,
    {
        self.shared.listeners.write().push(Arc::new(listener));
    }

    /// Drops every counter without firing removal events.
    pub fn clear(&self) {
        let mut maps = self.shared.maps.lock();
        maps.by_key.clear();
        maps.by_counter.clear();
        self.shared.bytes_used.store(0, Ordering::Release);
    }

    /// Number of live counters.
    pub fn len(&self) -> usize {
        self.shared.maps.lock().by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes currently charged against the budget.
    pub fn bytes_used(&self) -> usize {
        self.shared.bytes_used.load(Ordering::Acquire)
    }

    /// Configured byte budget (`0` = unlimited).
    pub fn max_bytes_used(&self) -> usize {
        self.shared.strategy.max_bytes_used
    }

    /// Bytes charged per counter in addition to its custom size.
    pub fn counter_overhead(&self) -> usize {
        self.shared.item_size
    }

    pub fn tracking_window(&self) -> Duration {
        self.shared.tracking_window
    }

    pub fn strategy(&self) -> &CleanupStrategy {
        &self.shared.strategy
    }

    pub fn comparer(&self) -> &C {
        &self.shared.comparer
    }

    /// Verifies the two maps are in lockstep and the byte total matches.
    pub fn check_invariants(&self) -> Result<(), InvariantError> {
        let maps = self.shared.maps.lock();
        if maps.by_key.len() != maps.by_counter.len() {
            return Err(InvariantError::new(format!(
                "key map has {} counters but reverse map has {}",
                maps.by_key.len(),
                maps.by_counter.len()
            )));
        }
        let mut expected = 0usize;
        for (key, counter) in &maps.by_key {
            match maps.by_counter.get(&counter.id()) {
                Some(owner) if owner == key => {},
                _ => {
                    return Err(InvariantError::new(format!(
                        "counter {} has no matching reverse entry",
                        counter.id()
                    )));
                },
            }
            expected = expected.saturating_add(self.shared.charge(counter.custom_size()));
        }
        let actual = self.bytes_used();
        if expected != actual {
            return Err(InvariantError::new(format!(
                "bytes_used is {} but live counters account for {}",
                actual, expected
            )));
        }
        Ok(())
    }
}

impl<C: KeyComparer> Shared<C> {
    fn increment(
        this: &Arc<Self>,
        key: C::Canonical,
        custom_size: usize,
        create_missing: bool,
    ) -> bool {
        let now = this.clock.now();
        {
            let mut maps = this.maps.lock();
            match maps.by_key.get(&key) {
                Some(existing) => {
                    let existing = Arc::clone(existing);
                    if custom_size > 0 {
                        let previous = existing.swap_custom_size(custom_size);
                        this.adjust_bytes(previous, custom_size);
                    }
                    // count and touch under the lock so a concurrent
                    // maintenance walk sees this counter as live
                    this.touch(&existing, now);
                },
                None if !create_missing => return false,
                None => {
                    let id = this.next_id.fetch_add(1, Ordering::Relaxed);
                    let counter = Arc::new(EventCounter::with_id(
                        id,
                        this.strategy.counter_granularity,
                        this.slot_duration,
                        now,
                    ));
                    counter.swap_custom_size(custom_size);
                    // counted before any eviction so a fresh key is not its own first victim
                    this.touch(&counter, now);
                    maps.by_counter.insert(id, key.clone());
                    maps.by_key.insert(key, counter);
                    this.add_bytes(this.charge(custom_size));
                    #[cfg(feature = "metrics")]
                    this.metrics.record_counter_created();
                },
            }
        }
        #[cfg(feature = "metrics")]
        this.metrics.record_increment();

        if this.over_budget() {
            this.cleanup(CleanupMode::MakeRoom);
        }
        Self::ping_cleanup(this, now);
        true
    }

    /// Caller holds the maps lock.
    fn touch(&self, counter: &EventCounter, now: Duration) {
        counter.increment_at(now, self.strategy.threading_precision);
        counter.record_touch(self.touch_sequence.fetch_add(1, Ordering::Relaxed) + 1);
    }

    /// Bytes charged for a counter carrying `custom_size`.
    #[inline]
    fn charge(&self, custom_size: usize) -> usize {
        self.item_size.saturating_add(custom_size)
    }

    fn add_bytes(&self, bytes: usize) {
        let _ = self
            .bytes_used
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                Some(used.saturating_add(bytes))
            });
    }

    fn sub_bytes(&self, bytes: usize) {
        let _ = self
            .bytes_used
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                Some(used.saturating_sub(bytes))
            });
    }

    fn over_budget(&self) -> bool {
        let max = self.strategy.max_bytes_used;
        max > 0 && self.bytes_used.load(Ordering::Acquire) > max
    }

    /// Caller holds the maps lock.
    fn adjust_bytes(&self, previous: usize, next: usize) {
        if next > previous {
            self.add_bytes(next - previous);
        } else if previous > next {
            self.sub_bytes(previous - next);
        }
    }

    /// Caller holds the maps lock.
    fn release_bytes(&self, counter: &EventCounter) -> usize {
        let bytes = self.charge(counter.custom_size());
        self.sub_bytes(bytes);
        bytes
    }

    fn ping_cleanup(this: &Arc<Self>, now: Duration) -> bool {
        {
            let mut last = this.last_cleanup_started.lock();
            if now.saturating_sub(*last) < this.strategy.minimum_cleanup_interval {
                return false;
            }
            *last = now;
        }
        #[cfg(feature = "metrics")]
        this.metrics.record_cleanup_scheduled();
        trace!("scheduling background usage maintenance");
        let shared = Arc::clone(this);
        rayon::spawn(move || {
            shared.cleanup(CleanupMode::Maintenance);
        });
        true
    }

    fn cleanup(&self, mode: CleanupMode) -> bool {
        let Some(guard) = self.cleanup_guard.try_lock() else {
            #[cfg(feature = "metrics")]
            self.metrics.record_cleanup_collapsed();
            trace!(?mode, "usage cleanup already running, skipping");
            return false;
        };
        let now = self.clock.now();
        *self.last_cleanup_started.lock() = now;

        let max = self.strategy.max_bytes_used;
        if mode == CleanupMode::MakeRoom && !self.over_budget() {
            return true;
        }
        #[cfg(feature = "metrics")]
        self.metrics.record_cleanup_run(mode);

        let snapshot: Vec<Arc<EventCounter>> =
            self.maps.lock().by_key.values().cloned().collect();

        // (sort value, touch sequence at ranking time, counter)
        let mut ranked: Vec<(u64, u64, Arc<EventCounter>)> = snapshot
            .into_iter()
            .map(|counter| (counter.value_at(now), counter.last_touch(), counter))
            .collect();
        ranked.sort_unstable_by_key(|&(value, touch, _)| (value, touch));

        let target = max / 10;
        let mut freed = 0usize;
        let mut removed = Vec::new();
        {
            let mut maps = self.maps.lock();
            for (sort_value, touch, counter) in &ranked {
                match mode {
                    CleanupMode::MakeRoom => {
                        if freed >= target && !self.over_budget() {
                            break;
                        }
                    },
                    CleanupMode::Maintenance => {
                        if *sort_value > 0 {
                            break;
                        }
                        if counter.last_touch() != *touch
                            || counter.value_at(self.clock.now()) > 0
                        {
                            continue;
                        }
                    },
                }
                let Some(key) = maps.by_counter.remove(&counter.id()) else {
                    // already removed since the snapshot
                    continue;
                };
                maps.by_key.remove(&key);
                freed = freed.saturating_add(self.release_bytes(counter));
                removed.push((key, counter.value_at(now)));
                #[cfg(feature = "metrics")]
                self.metrics.record_counter_evicted(mode);
            }
        }
        drop(guard);

        debug!(
            ?mode,
            removed = removed.len(),
            freed,
            bytes_used = self.bytes_used.load(Ordering::Relaxed),
            "usage cleanup pass finished"
        );
        self.notify(&removed);
        true
    }

    fn notify(&self, removed: &[(C::Canonical, u64)]) {
        if removed.is_empty() {
            return;
        }
        let listeners = self.listeners.read().clone();
        for (key, value) in removed {
            for listener in &listeners {
                listener.counter_removed(key, *value);
            }
        }
    }
}

#[cfg(feature = "metrics")]
impl<C: KeyComparer> MetricsSnapshotProvider<UsageMetricsSnapshot> for EventCountingDictionary<C> {
    fn snapshot(&self) -> UsageMetricsSnapshot {
        UsageMetricsSnapshot {
            live_counters: self.len(),
            bytes_used: self.bytes_used(),
            max_bytes_used: self.max_bytes_used(),
            ..self.shared.metrics.counters_snapshot()
        }
    }
}

#[cfg(feature = "metrics")]
impl<C: KeyComparer> MetricsReset for EventCountingDictionary<C> {
    fn reset_metrics(&self) {
        self.shared.metrics.reset_metrics();
    }
}
