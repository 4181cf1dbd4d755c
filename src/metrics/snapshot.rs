/// Point-in-time view of the usage tracker.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct UsageMetricsSnapshot {
    pub counters_created: u64,
    pub increments: u64,

    pub cleanups_scheduled: u64,
    pub cleanups_collapsed: u64, // attempts that found another cleanup running
    pub make_room_runs: u64,
    pub maintenance_runs: u64,

    pub evicted_make_room: u64,
    pub evicted_maintenance: u64,
    pub removed_explicit: u64,

    // gauges captured at snapshot time
    pub live_counters: usize,
    pub bytes_used: usize,
    pub max_bytes_used: usize,
}

/// Point-in-time view of a constrained cache and its tracker.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ConstrainedCacheMetricsSnapshot {
    pub get_calls: u64,
    pub get_hits: u64,
    pub get_misses: u64,

    pub set_calls: u64,
    pub set_new: u64,
    pub set_updates: u64,

    pub values_evicted: u64,
    pub evictions_skipped: u64, // key regained a counter before the callback ran

    pub entries: usize,
    pub usage: UsageMetricsSnapshot,
}
