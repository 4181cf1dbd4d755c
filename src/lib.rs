//! sourcecache: byte-bounded in-memory caching with rolling-window usage
//! tracking and incremental eviction.
//!
//! - [`ds::EventCounter`]: approximate event count over a sliding window.
//! - [`policy::EventCountingDictionary`]: per-key counters under a byte
//!   budget, evicting the least-used keys when the budget is exceeded.
//! - [`policy::ConstrainedCache`]: value store whose entries live exactly as
//!   long as their usage counters.
//! - [`source::SourceMemCache`]: serves original files from memory,
//!   materializing each key once under a per-key lock.

pub mod builder;
pub mod clock;
pub mod ds;
pub mod error;
pub mod policy;
pub mod source;

#[cfg(feature = "metrics")]
pub mod metrics;

pub mod prelude;
pub mod traits;
