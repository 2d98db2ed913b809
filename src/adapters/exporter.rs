//! Prometheus Exporter
//!
//! Mirrors a [`CacheStats`] snapshot into a private Prometheus registry and
//! renders it in the text exposition format.

use prometheus::{Encoder, Gauge, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder};

use crate::cache::{CacheStats, CacheTier};
use crate::error::Result;

const TIERS: [CacheTier; 3] = [CacheTier::L1, CacheTier::L2, CacheTier::L3];

/// Prometheus view of cache statistics
pub struct PrometheusExporter {
    registry: Registry,
    hits: IntGaugeVec,
    evictions: IntGaugeVec,
    entries: IntGaugeVec,
    misses: IntGauge,
    hit_rate: Gauge,
    compressions: IntGauge,
    dropped_writes: IntGauge,
    corrupted_entries: IntGauge,
    promotions: IntGauge,
    refreshes: IntGaugeVec,
    refresh_queue: IntGaugeVec,
    read_latency_us: IntGauge,
}

impl PrometheusExporter {
    /// Create an exporter with every metric registered under `prefix`
    pub fn new(prefix: &str) -> Result<Self> {
        let registry = Registry::new();
        let name = |metric: &str| format!("{}_{}", prefix, metric);

        let hits = IntGaugeVec::new(
            Opts::new(name("hits_total"), "Cache hits by serving tier"),
            &["tier"],
        )?;
        let evictions = IntGaugeVec::new(
            Opts::new(name("evictions_total"), "Entries removed to respect bounds or expiry"),
            &["tier"],
        )?;
        let entries = IntGaugeVec::new(
            Opts::new(name("entries"), "Entries currently held per tier"),
            &["tier"],
        )?;
        let misses = IntGauge::new(name("misses_total"), "Lookups missing every tier")?;
        let hit_rate = Gauge::new(name("hit_rate"), "hits / (hits + misses)")?;
        let compressions = IntGauge::new(name("compressions_total"), "Records stored compressed")?;
        let dropped_writes =
            IntGauge::new(name("dropped_writes_total"), "Tier writes abandoned after retry")?;
        let corrupted_entries =
            IntGauge::new(name("corrupted_entries_total"), "Undecodable records removed")?;
        let promotions = IntGauge::new(name("promotions_total"), "Copies into upper tiers")?;
        let refreshes = IntGaugeVec::new(
            Opts::new(name("refreshes_total"), "Background refresh activity"),
            &["outcome"],
        )?;
        let refresh_queue = IntGaugeVec::new(
            Opts::new(name("refresh_queue"), "Refresh tasks by state"),
            &["state"],
        )?;
        let read_latency_us = IntGauge::new(
            name("read_latency_microseconds"),
            "Smoothed read latency",
        )?;

        registry.register(Box::new(hits.clone()))?;
        registry.register(Box::new(evictions.clone()))?;
        registry.register(Box::new(entries.clone()))?;
        registry.register(Box::new(misses.clone()))?;
        registry.register(Box::new(hit_rate.clone()))?;
        registry.register(Box::new(compressions.clone()))?;
        registry.register(Box::new(dropped_writes.clone()))?;
        registry.register(Box::new(corrupted_entries.clone()))?;
        registry.register(Box::new(promotions.clone()))?;
        registry.register(Box::new(refreshes.clone()))?;
        registry.register(Box::new(refresh_queue.clone()))?;
        registry.register(Box::new(read_latency_us.clone()))?;

        Ok(Self {
            registry,
            hits,
            evictions,
            entries,
            misses,
            hit_rate,
            compressions,
            dropped_writes,
            corrupted_entries,
            promotions,
            refreshes,
            refresh_queue,
            read_latency_us,
        })
    }

    /// Copy a snapshot into the registered gauges
    pub fn update(&self, stats: &CacheStats) {
        for tier in TIERS {
            let label = tier.to_string();
            let (hits, evictions, entries) = match tier {
                CacheTier::L1 => (stats.l1_hits, stats.l1_evictions, Some(stats.sizes.l1)),
                CacheTier::L2 => (stats.l2_hits, stats.l2_evictions, stats.sizes.l2),
                CacheTier::L3 => (stats.l3_hits, stats.l3_evictions, stats.sizes.l3),
            };
            self.hits.with_label_values(&[label.as_str()]).set(hits as i64);
            self.evictions.with_label_values(&[label.as_str()]).set(evictions as i64);
            // Unconfigured tiers are left out of the entries gauge
            if let Some(entries) = entries {
                self.entries.with_label_values(&[label.as_str()]).set(entries as i64);
            }
        }

        self.misses.set(stats.misses as i64);
        self.hit_rate.set(stats.hit_rate);
        self.compressions.set(stats.compressions as i64);
        self.dropped_writes.set(stats.dropped_writes as i64);
        self.corrupted_entries.set(stats.corrupted_entries as i64);
        self.promotions.set(stats.promotions as i64);

        self.refreshes
            .with_label_values(&["triggered"])
            .set(stats.refreshes_triggered as i64);
        self.refreshes
            .with_label_values(&["completed"])
            .set(stats.refreshes_completed as i64);
        self.refreshes
            .with_label_values(&["failed"])
            .set(stats.refresh_failures as i64);

        self.refresh_queue
            .with_label_values(&["queued"])
            .set(stats.refresh_queue.queued as i64);
        self.refresh_queue
            .with_label_values(&["in_progress"])
            .set(stats.refresh_queue.in_progress as i64);

        self.read_latency_us.set(stats.read_latency_us as i64);
    }

    /// Text exposition of the registry
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer)
            .map_err(|e| crate::error::Error::Internal(format!("Non UTF-8 metrics output: {}", e)))
    }

    pub fn content_type(&self) -> &'static str {
        prometheus::TEXT_FORMAT
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

impl std::fmt::Debug for PrometheusExporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrometheusExporter").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::metrics::{CacheMetrics, RefreshQueueDepth, TierSizes};

    #[test]
    fn test_render_includes_tier_labels() {
        let metrics = CacheMetrics::new();
        metrics.record_hit(CacheTier::L1);
        metrics.record_hit(CacheTier::L3);
        metrics.record_miss();

        let stats = metrics.snapshot(
            TierSizes {
                l1: 3,
                l2: Some(5),
                l3: None,
            },
            RefreshQueueDepth::default(),
        );

        let exporter = PrometheusExporter::new("tiered_cache").unwrap();
        exporter.update(&stats);
        let text = exporter.render().unwrap();

        assert!(text.contains("tiered_cache_hits_total{tier=\"L1\"} 1"));
        assert!(text.contains("tiered_cache_hits_total{tier=\"L3\"} 1"));
        assert!(text.contains("tiered_cache_misses_total 1"));
        assert!(text.contains("tiered_cache_entries{tier=\"L2\"} 5"));
        assert!(!text.contains("tiered_cache_entries{tier=\"L3\"}"));
    }

    #[test]
    fn test_invalid_prefix_is_rejected() {
        assert!(PrometheusExporter::new("bad prefix").is_err());
    }
}
