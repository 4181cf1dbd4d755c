//! Fluent construction of [`ConstrainedCache`] instances.
//!
//! Collects every knob the cache accepts, validates them together in
//! [`try_build`](ConstrainedCacheBuilder::try_build), and hides the wiring
//! between the value store and its usage tracker.
//!
//! ## Example
//!
//! ```rust
//! use std::time::Duration;
//! use sourcecache::builder::ConstrainedCacheBuilder;
//! use sourcecache::traits::Ordinal;
//!
//! let cache = ConstrainedCacheBuilder::new(Ordinal::<u64>::new())
//!     .size_calculator(|_key: &u64, value: &String| value.len())
//!     .max_bytes(64 * 1024)
//!     .usage_window(Duration::from_secs(300))
//!     .build();
//! cache.set(&1, "hello".to_string());
//! assert_eq!(cache.get(&1).as_deref().map(String::as_str), Some("hello"));
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::clock::{Clock, MonotonicClock};
use crate::ds::event_counter::ThreadingPrecision;
use crate::error::ConfigError;
use crate::policy::constrained::{ConstrainedCache, SizeCalculator};
use crate::traits::KeyComparer;

pub const DEFAULT_USAGE_WINDOW: Duration = Duration::from_secs(20 * 60);
pub const DEFAULT_MIN_CLEANUP_INTERVAL: Duration = Duration::from_secs(10);

/// Builder for [`ConstrainedCache`].
pub struct ConstrainedCacheBuilder<C: KeyComparer, V> {
    comparer: C,
    size_fn: Option<Box<SizeCalculator<C::Key, V>>>,
    max_bytes: usize,
    usage_window: Duration,
    min_cleanup_interval: Duration,
    threading_precision: ThreadingPrecision,
    clock: Option<Arc<dyn Clock>>,
}

impl<C: KeyComparer, V> fmt::Debug for ConstrainedCacheBuilder<C, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConstrainedCacheBuilder")
            .field("has_size_fn", &self.size_fn.is_some())
            .field("max_bytes", &self.max_bytes)
            .field("usage_window", &self.usage_window)
            .field("min_cleanup_interval", &self.min_cleanup_interval)
            .field("threading_precision", &self.threading_precision)
            .finish()
    }
}

impl<C, V> ConstrainedCacheBuilder<C, V>
where
    C: KeyComparer,
    V: Send + Sync + 'static,
{
    /// Starts a builder with an unlimited budget, a 20 minute usage window
    /// and a 10 second maintenance interval.
    pub fn new(comparer: C) -> Self {
        Self {
            comparer,
            size_fn: None,
            max_bytes: 0,
            usage_window: DEFAULT_USAGE_WINDOW,
            min_cleanup_interval: DEFAULT_MIN_CLEANUP_INTERVAL,
            threading_precision: ThreadingPrecision::Fast,
            clock: None,
        }
    }

    /// Byte cost of an entry. Required.
    pub fn size_calculator<F>(mut self, size_fn: F) -> Self
    where
        F: Fn(&C::Key, &V) -> usize + Send + Sync + 'static,
    {
        self.size_fn = Some(Box::new(size_fn));
        self
    }

    /// Byte ceiling; `0` disables it.
    pub fn max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub fn usage_window(mut self, window: Duration) -> Self {
        self.usage_window = window;
        self
    }

    pub fn min_cleanup_interval(mut self, interval: Duration) -> Self {
        self.min_cleanup_interval = interval;
        self
    }

    pub fn threading_precision(mut self, precision: ThreadingPrecision) -> Self {
        self.threading_precision = precision;
        self
    }

    /// Time source for usage windows. Defaults to [`MonotonicClock`].
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn try_build(self) -> Result<ConstrainedCache<C, V>, ConfigError> {
        let size_fn = self
            .size_fn
            .ok_or_else(|| ConfigError::new("a size calculator is required"))?;
        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(MonotonicClock::new()));
        ConstrainedCache::from_parts(
            self.comparer,
            size_fn,
            self.max_bytes,
            self.usage_window,
            self.min_cleanup_interval,
            self.threading_precision,
            clock,
        )
    }

    /// # Panics
    ///
    /// Panics on invalid configuration; see [`try_build`](Self::try_build).
    pub fn build(self) -> ConstrainedCache<C, V> {
        match self.try_build() {
            Ok(cache) => cache,
            Err(err) => panic!("{}", err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::policy::event_counting::CleanupMode;
    use crate::traits::{CaseInsensitive, Ordinal};

    fn len_of(_: &str, value: &Vec<u8>) -> usize {
        value.len()
    }

    #[test]
    fn builds_with_defaults() {
        let cache = ConstrainedCacheBuilder::new(CaseInsensitive)
            .size_calculator(len_of)
            .build();
        assert_eq!(cache.max_bytes(), 0);
        cache.set("k", vec![1, 2, 3]);
        assert!(cache.contains("K"));
    }

    #[test]
    fn missing_size_calculator_rejected() {
        let err = ConstrainedCacheBuilder::<Ordinal<u8>, u8>::new(Ordinal::new())
            .try_build()
            .unwrap_err();
        assert!(err.message().contains("size calculator"));
    }

    #[test]
    fn zero_window_rejected() {
        let result = ConstrainedCacheBuilder::new(CaseInsensitive)
            .size_calculator(len_of)
            .usage_window(Duration::ZERO)
            .try_build();
        assert!(result.is_err());
    }

    #[test]
    fn zero_interval_rejected() {
        let err = ConstrainedCacheBuilder::new(CaseInsensitive)
            .size_calculator(len_of)
            .min_cleanup_interval(Duration::ZERO)
            .try_build()
            .unwrap_err();
        assert!(err.message().contains("interval"));
    }

    #[test]
    #[should_panic(expected = "size calculator")]
    fn build_panics_without_size_calculator() {
        let _ = ConstrainedCacheBuilder::<Ordinal<u8>, u8>::new(Ordinal::new()).build();
    }

    #[test]
    fn injected_clock_drives_expiry() {
        let clock = Arc::new(ManualClock::new());
        let cache = ConstrainedCacheBuilder::new(CaseInsensitive)
            .size_calculator(len_of)
            .usage_window(Duration::from_secs(16))
            .min_cleanup_interval(Duration::from_secs(3600))
            .threading_precision(ThreadingPrecision::Accurate)
            .clock(clock.clone())
            .build();
        cache.set("a", vec![0; 8]);
        clock.advance(Duration::from_secs(17));
        cache.cleanup(CleanupMode::Maintenance);
        assert!(cache.get("a").is_none());
    }
}
