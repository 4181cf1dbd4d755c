use std::io::Write;

use parking_lot::Mutex;

use crate::metrics::snapshot::{ConstrainedCacheMetricsSnapshot, UsageMetricsSnapshot};
use crate::metrics::traits::MetricsExporter;

/// Prometheus text exporter for usage and cache snapshots.
///
/// Writes the Prometheus text exposition format so output can be scraped
/// directly or forwarded to an OpenTelemetry collector. Write errors are
/// dropped; metrics export never affects cache behaviour.
#[derive(Debug)]
pub struct PrometheusTextExporter<W: Write + Send + Sync> {
    prefix: String,
    writer: Mutex<W>,
}

impl<W: Write + Send + Sync> PrometheusTextExporter<W> {
    pub fn new(prefix: impl Into<String>, writer: W) -> Self {
        Self {
            prefix: prefix.into(),
            writer: Mutex::new(writer),
        }
    }

    /// Consumes the exporter and returns the underlying writer.
    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }

    fn write_metric(&self, kind: &str, suffix: &str, value: u64) {
        let name = self.metric_name(suffix);
        let mut writer = self.writer.lock();
        let _ = writeln!(writer, "# TYPE {} {}", name, kind);
        let _ = writeln!(writer, "{} {}", name, value);
    }

    fn write_counter(&self, suffix: &str, value: u64) {
        self.write_metric("counter", suffix, value);
    }

    fn write_gauge(&self, suffix: &str, value: usize) {
        self.write_metric("gauge", suffix, value as u64);
    }

    fn metric_name(&self, suffix: &str) -> String {
        if self.prefix.is_empty() {
            suffix.to_string()
        } else {
            format!("{}_{}", self.prefix, suffix)
        }
    }
}

impl<W: Write + Send + Sync> MetricsExporter<UsageMetricsSnapshot> for PrometheusTextExporter<W> {
    fn export(&self, snapshot: &UsageMetricsSnapshot) {
        self.write_counter("usage_counters_created_total", snapshot.counters_created);
        self.write_counter("usage_increments_total", snapshot.increments);
        self.write_counter("usage_cleanups_scheduled_total", snapshot.cleanups_scheduled);
        self.write_counter("usage_cleanups_collapsed_total", snapshot.cleanups_collapsed);
        self.write_counter("usage_make_room_runs_total", snapshot.make_room_runs);
        self.write_counter("usage_maintenance_runs_total", snapshot.maintenance_runs);
        self.write_counter("usage_evicted_make_room_total", snapshot.evicted_make_room);
        self.write_counter(
            "usage_evicted_maintenance_total",
            snapshot.evicted_maintenance,
        );
        self.write_counter("usage_removed_explicit_total", snapshot.removed_explicit);
        self.write_gauge("usage_live_counters", snapshot.live_counters);
        self.write_gauge("usage_bytes_used", snapshot.bytes_used);
        self.write_gauge("usage_max_bytes_used", snapshot.max_bytes_used);
    }
}

impl<W: Write + Send + Sync> MetricsExporter<ConstrainedCacheMetricsSnapshot>
    for PrometheusTextExporter<W>
{
    fn export(&self, snapshot: &ConstrainedCacheMetricsSnapshot) {
        self.write_counter("get_calls_total", snapshot.get_calls);
        self.write_counter("get_hits_total", snapshot.get_hits);
        self.write_counter("get_misses_total", snapshot.get_misses);
        self.write_counter("set_calls_total", snapshot.set_calls);
        self.write_counter("set_new_total", snapshot.set_new);
        self.write_counter("set_updates_total", snapshot.set_updates);
        self.write_counter("values_evicted_total", snapshot.values_evicted);
        self.write_counter("evictions_skipped_total", snapshot.evictions_skipped);
        self.write_gauge("entries", snapshot.entries);
        MetricsExporter::<UsageMetricsSnapshot>::export(self, &snapshot.usage);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exports_prefixed_counters_and_gauges() {
        let exporter = PrometheusTextExporter::new("imgcache", Vec::new());
        let snapshot = ConstrainedCacheMetricsSnapshot {
            get_hits: 3,
            get_calls: 4,
            entries: 2,
            usage: UsageMetricsSnapshot {
                bytes_used: 900,
                ..Default::default()
            },
            ..Default::default()
        };
        exporter.export(&snapshot);
        let text = String::from_utf8(exporter.into_inner()).unwrap();
        assert!(text.contains("# TYPE imgcache_get_hits_total counter\nimgcache_get_hits_total 3\n"));
        assert!(text.contains("# TYPE imgcache_entries gauge\nimgcache_entries 2\n"));
        assert!(text.contains("imgcache_usage_bytes_used 900"));
    }

    #[test]
    fn empty_prefix_uses_bare_names() {
        let exporter = PrometheusTextExporter::new("", Vec::new());
        exporter.export(&UsageMetricsSnapshot::default());
        let text = String::from_utf8(exporter.into_inner()).unwrap();
        assert!(text.contains("\nusage_increments_total 0\n"));
    }
}
