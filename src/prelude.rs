pub use crate::builder::ConstrainedCacheBuilder;
pub use crate::clock::{Clock, ManualClock, MonotonicClock};
pub use crate::ds::{EventCounter, KeyedLocks, ThreadingPrecision};
pub use crate::error::{ConfigError, IntegrityError, InvariantError, SourceError};
#[cfg(feature = "metrics")]
pub use crate::metrics::exporter::PrometheusTextExporter;
#[cfg(feature = "metrics")]
pub use crate::metrics::snapshot::{ConstrainedCacheMetricsSnapshot, UsageMetricsSnapshot};
#[cfg(feature = "metrics")]
pub use crate::metrics::traits::{MetricsExporter, MetricsReset, MetricsSnapshotProvider};
pub use crate::policy::constrained::ConstrainedCache;
pub use crate::policy::event_counting::{CleanupMode, CleanupStrategy, EventCountingDictionary};
pub use crate::source::{
    CacheMode, CachedFile, FsSourceFile, SourceCacheConfig, SourceFile, SourceMemCache,
};
pub use crate::traits::{CaseInsensitive, CounterRemovedListener, KeyComparer, Ordinal};
