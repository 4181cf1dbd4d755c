//! # Constrained Cache
//!
//! Byte-bounded value store whose eviction is driven entirely by an
//! [`EventCountingDictionary`]: values live as long as their usage counter.
//!
//! ## Architecture
//!
//! ```text
//!   ┌───────────────────────────────────────────────────────────────────────┐
//!   │                       ConstrainedCache<C, V>                          │
//!   │                                                                       │
//!   │   data: ReentrantMutex<RefCell<FxHashMap<Canonical, Arc<V>>>>         │
//!   │   usage: EventCountingDictionary<C>  (granularity 16)                 │
//!   │                                                                       │
//!   │   set(k, v)                                                           │
//!   │     size = size_fn(k, v) + ENTRY_OVERHEAD_BYTES   (no lock held)      │
//!   │     lock(data) → insert → usage.increment(k, size)                    │
//!   │                               │ over budget?                          │
//!   │                               ▼                                       │
//!   │                       MakeRoom on this thread                         │
//!   │                               │ counters removed, usage locks freed   │
//!   │                               ▼                                       │
//!   │                    listener: lock(data) again (re-entrant)            │
//!   │                    key still tracked? keep : remove value             │
//!   │                                                                       │
//!   │   get(k)                                                              │
//!   │     lock(data) → lookup → hit: touch counter (size unchanged)         │
//!   └───────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Lock order
//!
//! Forward paths take the data lock and then the usage locks. The removal
//! listener runs after the usage locks are released and only then takes the
//! data lock, so the two orders never invert. The data lock is re-entrant
//! because a `set` that triggers `MakeRoom` receives the removal callbacks
//! on its own thread while still holding it.
//!
//! ## Example Usage
//!
//! ```
//! use std::time::Duration;
//! use sourcecache::policy::constrained::ConstrainedCache;
//! use sourcecache::traits::CaseInsensitive;
//!
//! let cache = ConstrainedCache::new(
//!     CaseInsensitive,
//!     |key: &str, value: &Vec<u8>| key.len() + value.len(),
//!     1 << 20,
//!     Duration::from_secs(60),
//!     Duration::from_secs(10),
//! );
//! cache.set("/Img/A.png", vec![0u8; 128]);
//! assert_eq!(cache.get("/img/a.PNG").map(|v| v.len()), Some(128));
//! assert!(cache.get("/img/b.png").is_none());
//! ```

use std::cell::RefCell;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::ReentrantMutex;
use rustc_hash::FxHashMap;

use crate::clock::{Clock, MonotonicClock};
use crate::ds::event_counter::ThreadingPrecision;
use crate::error::{ConfigError, InvariantError};
#[cfg(feature = "metrics")]
use crate::metrics::metrics_impl::CacheMetrics;
#[cfg(feature = "metrics")]
use crate::metrics::snapshot::{ConstrainedCacheMetricsSnapshot, UsageMetricsSnapshot};
#[cfg(feature = "metrics")]
use crate::metrics::traits::{CacheMetricsRecorder, MetricsReset, MetricsSnapshotProvider};
use crate::policy::event_counting::{CleanupMode, CleanupStrategy, EventCountingDictionary};
use crate::traits::KeyComparer;

/// Slots per usage counter in a constrained cache.
pub const CACHE_COUNTER_GRANULARITY: usize = 16;

/// Fixed bytes charged per entry on top of the size calculator's result.
pub const ENTRY_OVERHEAD_BYTES: usize = 48;

/// Caller-defined byte cost of an entry.
pub type SizeCalculator<K, V> = dyn Fn(&K, &V) -> usize + Send + Sync;

type ValueMap<K, V> = FxHashMap<K, Arc<V>>;

struct Inner<C: KeyComparer, V> {
    data: ReentrantMutex<RefCell<ValueMap<C::Canonical, V>>>,
    usage: EventCountingDictionary<C>,
    size_fn: Box<SizeCalculator<C::Key, V>>,
    max_bytes: usize,
    #[cfg(feature = "metrics")]
    metrics: CacheMetrics,
}

impl<C: KeyComparer, V> Inner<C, V> {
    /// Removal listener body. Runs with no usage lock held.
    fn on_counter_removed(&self, key: &C::Canonical) {
        let data = self.data.lock();
        // a racing set may already have re-created the counter
        if self.usage.contains_canonical(key) {
            #[cfg(feature = "metrics")]
            self.metrics.record_eviction_skipped();
            return;
        }
        let removed = data.borrow_mut().remove(key);
        #[cfg(feature = "metrics")]
        if removed.is_some() {
            self.metrics.record_value_evicted();
        }
        drop(data);
        drop(removed);
    }
}

/// Thread-safe, byte-bounded cache with usage-ranked eviction.
///
/// Cloning is cheap and yields a handle to the same cache.
pub struct ConstrainedCache<C: KeyComparer, V> {
    inner: Arc<Inner<C, V>>,
}

impl<C: KeyComparer, V> Clone for ConstrainedCache<C, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: KeyComparer, V> fmt::Debug for ConstrainedCache<C, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let len = self.inner.data.lock().borrow().len();
        f.debug_struct("ConstrainedCache")
            .field("len", &len)
            .field("bytes_used", &self.inner.usage.bytes_used())
            .field("max_bytes", &self.inner.max_bytes)
            .finish()
    }
}

impl<C, V> ConstrainedCache<C, V>
where
    C: KeyComparer,
    V: Send + Sync + 'static,
{
    /// Creates a cache on the monotonic clock.
    ///
    /// `max_bytes == 0` disables the byte ceiling.
    ///
    /// # Panics
    ///
    /// Panics if `usage_window` or `min_cleanup_interval` is zero.
    pub fn new<F>(
        comparer: C,
        size_fn: F,
        max_bytes: usize,
        usage_window: Duration,
        min_cleanup_interval: Duration,
    ) -> Self
    where
        F: Fn(&C::Key, &V) -> usize + Send + Sync + 'static,
    {
        match Self::try_new(comparer, size_fn, max_bytes, usage_window, min_cleanup_interval) {
            Ok(cache) => cache,
            Err(err) => panic!("{}", err),
        }
    }

    pub fn try_new<F>(
        comparer: C,
        size_fn: F,
        max_bytes: usize,
        usage_window: Duration,
        min_cleanup_interval: Duration,
    ) -> Result<Self, ConfigError>
    where
        F: Fn(&C::Key, &V) -> usize + Send + Sync + 'static,
    {
        Self::from_parts(
            comparer,
            Box::new(size_fn),
            max_bytes,
            usage_window,
            min_cleanup_interval,
            ThreadingPrecision::Fast,
            Arc::new(MonotonicClock::new()),
        )
    }

    pub(crate) fn from_parts(
        comparer: C,
        size_fn: Box<SizeCalculator<C::Key, V>>,
        max_bytes: usize,
        usage_window: Duration,
        min_cleanup_interval: Duration,
        threading_precision: ThreadingPrecision,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        if usage_window.is_zero() {
            return Err(ConfigError::new("usage window must be > 0"));
        }
        let strategy = CleanupStrategy {
            counter_granularity: CACHE_COUNTER_GRANULARITY,
            max_bytes_used: max_bytes,
            minimum_cleanup_interval: min_cleanup_interval,
            threading_precision,
        };
        let usage = EventCountingDictionary::try_with_clock(comparer, usage_window, strategy, clock)?;
        let inner = Arc::new(Inner {
            data: ReentrantMutex::new(RefCell::new(FxHashMap::default())),
            usage,
            size_fn,
            max_bytes,
            #[cfg(feature = "metrics")]
            metrics: CacheMetrics::default(),
        });

        let weak: Weak<Inner<C, V>> = Arc::downgrade(&inner);
        inner.usage.subscribe(move |key: &C::Canonical, _value: u64| {
            if let Some(inner) = weak.upgrade() {
                inner.on_counter_removed(key);
            }
        });
        Ok(Self { inner })
    }

    /// Returns the value for `key` and records a usage event, or `None`.
    pub fn get(&self, key: &C::Key) -> Option<Arc<V>> {
        let inner = &self.inner;
        let canonical = inner.usage.comparer().canonicalize(key);
        let data = inner.data.lock();
        let hit = data.borrow().get(&canonical).cloned();
        match hit {
            Some(value) => {
                inner.usage.touch_canonical(canonical);
                drop(data);
                #[cfg(feature = "metrics")]
                inner.metrics.record_get_hit();
                Some(value)
            },
            None => {
                drop(data);
                #[cfg(feature = "metrics")]
                inner.metrics.record_get_miss();
                None
            },
        }
    }

    /// Stores `value` under `key`, charging its size and counting the store
    /// as a use. May evict synchronously before returning, possibly
    /// including this entry if it alone exceeds the budget.
    ///
    /// Accepts either an owned value or an `Arc` the caller keeps sharing.
    pub fn set(&self, key: &C::Key, value: impl Into<Arc<V>>) {
        let inner = &self.inner;
        let value = value.into();
        // a panicking size function unwinds before any lock is taken
        let size = (inner.size_fn)(key, &*value).saturating_add(ENTRY_OVERHEAD_BYTES);
        let canonical = inner.usage.comparer().canonicalize(key);

        let data = inner.data.lock();
        let previous = data.borrow_mut().insert(canonical.clone(), value);
        #[cfg(feature = "metrics")]
        if previous.is_some() {
            inner.metrics.record_set_update();
        } else {
            inner.metrics.record_set_new();
        }
        inner.usage.increment_canonical(canonical, size);
        drop(data);
        drop(previous);
    }

    /// Removes `key` and its usage counter. Returns the removed value.
    pub fn remove(&self, key: &C::Key) -> Option<Arc<V>> {
        let inner = &self.inner;
        let canonical = inner.usage.comparer().canonicalize(key);
        let data = inner.data.lock();
        let removed = data.borrow_mut().remove(&canonical);
        inner.usage.remove_canonical(&canonical);
        drop(data);
        removed
    }

    /// Returns `true` if a value is stored for `key`. Does not count as a use.
    pub fn contains(&self, key: &C::Key) -> bool {
        let canonical = self.inner.usage.comparer().canonicalize(key);
        self.inner.data.lock().borrow().contains_key(&canonical)
    }

    pub fn len(&self) -> usize {
        self.inner.data.lock().borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes charged against the budget, including tracker overhead.
    pub fn bytes_used(&self) -> usize {
        self.inner.usage.bytes_used()
    }

    pub fn max_bytes(&self) -> usize {
        self.inner.max_bytes
    }

    /// Bytes the usage tracker charges per entry on top of its size.
    pub fn counter_overhead(&self) -> usize {
        self.inner.usage.counter_overhead()
    }

    /// Usage events recorded for `key` inside the window.
    pub fn usage_count(&self, key: &C::Key) -> u64 {
        self.inner.usage.value(key)
    }

    /// Schedules background maintenance if the minimum interval has elapsed.
    pub fn ping_cleanup(&self) -> bool {
        self.inner.usage.ping_cleanup()
    }

    /// Runs a cleanup pass on the calling thread.
    pub fn cleanup(&self, mode: CleanupMode) -> bool {
        self.inner.usage.cleanup(mode)
    }

    /// Checks tracker accounting and that every value has a counter and vice
    /// versa. Only meaningful while no other thread is using the cache.
    pub fn check_invariants(&self) -> Result<(), InvariantError> {
        let inner = &self.inner;
        let data = inner.data.lock();
        inner.usage.check_invariants()?;
        let map = data.borrow();
        if map.len() != inner.usage.len() {
            return Err(InvariantError::new(format!(
                "{} values but {} usage counters",
                map.len(),
                inner.usage.len()
            )));
        }
        if map.keys().any(|key| !inner.usage.contains_canonical(key)) {
            return Err(InvariantError::new("value stored without a usage counter"));
        }
        if inner.max_bytes > 0 && inner.usage.bytes_used() > inner.max_bytes {
            return Err(InvariantError::new(format!(
                "bytes_used {} exceeds budget {}",
                inner.usage.bytes_used(),
                inner.max_bytes
            )));
        }
        Ok(())
    }
}

#[cfg(feature = "metrics")]
impl<C, V> MetricsSnapshotProvider<ConstrainedCacheMetricsSnapshot> for ConstrainedCache<C, V>
where
    C: KeyComparer,
    V: Send + Sync + 'static,
{
    fn snapshot(&self) -> ConstrainedCacheMetricsSnapshot {
        ConstrainedCacheMetricsSnapshot {
            entries: self.len(),
            usage: MetricsSnapshotProvider::<UsageMetricsSnapshot>::snapshot(&self.inner.usage),
            ..self.inner.metrics.counters_snapshot()
        }
    }
}

#[cfg(feature = "metrics")]
impl<C: KeyComparer, V> MetricsReset for ConstrainedCache<C, V> {
    fn reset_metrics(&self) {
        self.inner.metrics.reset_metrics();
        self.inner.usage.reset_metrics();
    }
}
