//! # Metrics Trait Hierarchy
//!
//! ```text
//!   ┌─────────────────────────────┐      ┌─────────────────────────────┐
//!   │    UsageMetricsRecorder     │      │    CacheMetricsRecorder     │
//!   │  counter_created/increment  │      │  get_hit/get_miss           │
//!   │  cleanup_* / removed        │      │  set_new/set_update/evict   │
//!   └──────────────┬──────────────┘      └──────────────┬──────────────┘
//!                  │                                    │
//!                  ▼                                    ▼
//!        EventCountingDictionary               ConstrainedCache
//!
//!   Consumption (decoupled from recording):
//!   ┌──────────────────────────────┐    ┌──────────────────────────────┐
//!   │ MetricsSnapshotProvider<S>   │    │ MetricsExporter<S>           │
//!   │ (bench/test)                 │    │ (production monitoring)      │
//!   └──────────────────────────────┘    └──────────────────────────────┘
//! ```
//!
//! Recorders take `&self`: both structures are shared across threads, so
//! every counter is an atomic and every method is a relaxed increment.

use crate::policy::event_counting::CleanupMode;

/// Counters for the usage tracker.
pub trait UsageMetricsRecorder {
    fn record_counter_created(&self);
    fn record_increment(&self);
    fn record_cleanup_scheduled(&self);
    fn record_cleanup_run(&self, mode: CleanupMode);
    fn record_cleanup_collapsed(&self);
    fn record_counter_evicted(&self, mode: CleanupMode);
    fn record_counter_removed(&self);
}

/// Counters for the value cache.
pub trait CacheMetricsRecorder {
    fn record_get_hit(&self);
    fn record_get_miss(&self);
    fn record_set_new(&self);
    fn record_set_update(&self);
    fn record_value_evicted(&self);
    fn record_eviction_skipped(&self);
}

/// Snapshot provider for bench/testing.
pub trait MetricsSnapshotProvider<S> {
    fn snapshot(&self) -> S;
}

/// Reset metrics between tests or benchmark iterations.
pub trait MetricsReset {
    fn reset_metrics(&self);
}

/// Export/publish metrics to production monitoring backends.
pub trait MetricsExporter<S> {
    fn export(&self, snapshot: &S);
}
