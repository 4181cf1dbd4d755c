pub mod constrained;
pub mod event_counting;

pub use constrained::{CACHE_COUNTER_GRANULARITY, ConstrainedCache, ENTRY_OVERHEAD_BYTES};
pub use event_counting::{
    CleanupMode, CleanupStrategy, EventCountingDictionary, MAX_COUNTER_GRANULARITY, MIN_SLOT_DURATION,
};
