//! Usage-tracker and cache metrics (feature `metrics`).
//!
//! Recording, snapshotting and export are split into separate traits so the
//! hot paths only ever touch relaxed atomics.

pub mod exporter;
pub mod metrics_impl;
pub mod snapshot;
pub mod traits;
