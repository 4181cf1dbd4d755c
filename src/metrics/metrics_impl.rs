use std::sync::atomic::{AtomicU64, Ordering};

use crate::metrics::snapshot::{ConstrainedCacheMetricsSnapshot, UsageMetricsSnapshot};
use crate::metrics::traits::{CacheMetricsRecorder, MetricsReset, UsageMetricsRecorder};
use crate::policy::event_counting::CleanupMode;

#[inline]
fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

#[inline]
fn read(counter: &AtomicU64) -> u64 {
    counter.load(Ordering::Relaxed)
}

#[derive(Debug, Default)]
pub struct UsageMetrics {
    pub counters_created: AtomicU64,
    pub increments: AtomicU64,
    pub cleanups_scheduled: AtomicU64,
    pub cleanups_collapsed: AtomicU64,
    pub make_room_runs: AtomicU64,
    pub maintenance_runs: AtomicU64,
    pub evicted_make_room: AtomicU64,
    pub evicted_maintenance: AtomicU64,
    pub removed_explicit: AtomicU64,
}

impl UsageMetrics {
    /// Copies the counters; gauges are filled in by the owner.
    pub fn counters_snapshot(&self) -> UsageMetricsSnapshot {
        UsageMetricsSnapshot {
            counters_created: read(&self.counters_created),
            increments: read(&self.increments),
            cleanups_scheduled: read(&self.cleanups_scheduled),
            cleanups_collapsed: read(&self.cleanups_collapsed),
            make_room_runs: read(&self.make_room_runs),
            maintenance_runs: read(&self.maintenance_runs),
            evicted_make_room: read(&self.evicted_make_room),
            evicted_maintenance: read(&self.evicted_maintenance),
            removed_explicit: read(&self.removed_explicit),
            ..Default::default()
        }
    }
}

impl UsageMetricsRecorder for UsageMetrics {
    fn record_counter_created(&self) {
        bump(&self.counters_created);
    }

    fn record_increment(&self) {
        bump(&self.increments);
    }

    fn record_cleanup_scheduled(&self) {
        bump(&self.cleanups_scheduled);
    }

    fn record_cleanup_run(&self, mode: CleanupMode) {
        match mode {
            CleanupMode::MakeRoom => bump(&self.make_room_runs),
            CleanupMode::Maintenance => bump(&self.maintenance_runs),
        }
    }

    fn record_cleanup_collapsed(&self) {
        bump(&self.cleanups_collapsed);
    }

    fn record_counter_evicted(&self, mode: CleanupMode) {
        match mode {
            CleanupMode::MakeRoom => bump(&self.evicted_make_room),
            CleanupMode::Maintenance => bump(&self.evicted_maintenance),
        }
    }

    fn record_counter_removed(&self) {
        bump(&self.removed_explicit);
    }
}

impl MetricsReset for UsageMetrics {
    fn reset_metrics(&self) {
        for counter in [
            &self.counters_created,
            &self.increments,
            &self.cleanups_scheduled,
            &self.cleanups_collapsed,
            &self.make_room_runs,
            &self.maintenance_runs,
            &self.evicted_make_room,
            &self.evicted_maintenance,
            &self.removed_explicit,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

#[derive(Debug, Default)]
pub struct CacheMetrics {
    pub get_hits: AtomicU64,
    pub get_misses: AtomicU64,
    pub set_new: AtomicU64,
    pub set_updates: AtomicU64,
    pub values_evicted: AtomicU64,
    pub evictions_skipped: AtomicU64,
}

impl CacheMetrics {
    /// Copies the counters; gauges and the usage section are filled in by the owner.
    pub fn counters_snapshot(&self) -> ConstrainedCacheMetricsSnapshot {
        let get_hits = read(&self.get_hits);
        let get_misses = read(&self.get_misses);
        let set_new = read(&self.set_new);
        let set_updates = read(&self.set_updates);
        ConstrainedCacheMetricsSnapshot {
            get_calls: get_hits + get_misses,
            get_hits,
            get_misses,
            set_calls: set_new + set_updates,
            set_new,
            set_updates,
            values_evicted: read(&self.values_evicted),
            evictions_skipped: read(&self.evictions_skipped),
            ..Default::default()
        }
    }
}

impl CacheMetricsRecorder for CacheMetrics {
    fn record_get_hit(&self) {
        bump(&self.get_hits);
    }

    fn record_get_miss(&self) {
        bump(&self.get_misses);
    }

    fn record_set_new(&self) {
        bump(&self.set_new);
    }

    fn record_set_update(&self) {
        bump(&self.set_updates);
    }

    fn record_value_evicted(&self) {
        bump(&self.values_evicted);
    }

    fn record_eviction_skipped(&self) {
        bump(&self.evictions_skipped);
    }
}

impl MetricsReset for CacheMetrics {
    fn reset_metrics(&self) {
        for counter in [
            &self.get_hits,
            &self.get_misses,
            &self.set_new,
            &self.set_updates,
            &self.values_evicted,
            &self.evictions_skipped,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_metrics_split_by_mode() {
        let metrics = UsageMetrics::default();
        metrics.record_cleanup_run(CleanupMode::MakeRoom);
        metrics.record_cleanup_run(CleanupMode::Maintenance);
        metrics.record_cleanup_run(CleanupMode::Maintenance);
        metrics.record_counter_evicted(CleanupMode::MakeRoom);
        let snap = metrics.counters_snapshot();
        assert_eq!(snap.make_room_runs, 1);
        assert_eq!(snap.maintenance_runs, 2);
        assert_eq!(snap.evicted_make_room, 1);
        assert_eq!(snap.evicted_maintenance, 0);
    }

    #[test]
    fn cache_metrics_derive_call_totals() {
        let metrics = CacheMetrics::default();
        metrics.record_get_hit();
        metrics.record_get_miss();
        metrics.record_get_miss();
        metrics.record_set_new();
        let snap = metrics.counters_snapshot();
        assert_eq!(snap.get_calls, 3);
        assert_eq!(snap.get_misses, 2);
        assert_eq!(snap.set_calls, 1);
    }

    #[test]
    fn reset_zeroes_everything() {
        let metrics = CacheMetrics::default();
        metrics.record_get_hit();
        metrics.record_value_evicted();
        metrics.reset_metrics();
        assert_eq!(metrics.counters_snapshot(), Default::default());

        let usage = UsageMetrics::default();
        usage.record_increment();
        usage.reset_metrics();
        assert_eq!(usage.counters_snapshot(), Default::default());
    }
}
