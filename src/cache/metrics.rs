//! Cache Metrics Collection
//!
//! Lock-free counters for every tier plus a serializable snapshot.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;

use super::CacheTier;

/// Cache metrics collector
#[derive(Debug, Default)]
pub struct CacheMetrics {
    // Hits by tier, final misses
    l1_hits: AtomicU64,
    l2_hits: AtomicU64,
    l3_hits: AtomicU64,
    misses: AtomicU64,

    // Removals to respect bounds or expiry
    l1_evictions: AtomicU64,
    l2_evictions: AtomicU64,
    l3_evictions: AtomicU64,

    // Write path
    compressions: AtomicU64,
    dropped_writes: AtomicU64,
    corrupted_entries: AtomicU64,
    promotions: AtomicU64,

    // Background refresh
    refreshes_triggered: AtomicU64,
    refreshes_completed: AtomicU64,
    refresh_failures: AtomicU64,

    // Read latency (microseconds, exponential moving average)
    read_latency_us: AtomicU64,
}

impl CacheMetrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self, tier: CacheTier) {
        match tier {
            CacheTier::L1 => self.l1_hits.fetch_add(1, Ordering::Relaxed),
            CacheTier::L2 => self.l2_hits.fetch_add(1, Ordering::Relaxed),
            CacheTier::L3 => self.l3_hits.fetch_add(1, Ordering::Relaxed),
        };
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_evictions(&self, tier: CacheTier, count: u64) {
        if count == 0 {
            return;
        }
        match tier {
            CacheTier::L1 => self.l1_evictions.fetch_add(count, Ordering::Relaxed),
            CacheTier::L2 => self.l2_evictions.fetch_add(count, Ordering::Relaxed),
            CacheTier::L3 => self.l3_evictions.fetch_add(count, Ordering::Relaxed),
        };
    }

    pub fn record_compression(&self) {
        self.compressions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped_write(&self) {
        self.dropped_writes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_corruption(&self, count: u64) {
        self.corrupted_entries.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_promotion(&self) {
        self.promotions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_refresh_triggered(&self) {
        self.refreshes_triggered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_refresh_completed(&self) {
        self.refreshes_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_refresh_failure(&self) {
        self.refresh_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn hits(&self, tier: CacheTier) -> u64 {
        match tier {
            CacheTier::L1 => self.l1_hits.load(Ordering::Relaxed),
            CacheTier::L2 => self.l2_hits.load(Ordering::Relaxed),
            CacheTier::L3 => self.l3_hits.load(Ordering::Relaxed),
        }
    }

    pub fn total_hits(&self) -> u64 {
        self.hits(CacheTier::L1) + self.hits(CacheTier::L2) + self.hits(CacheTier::L3)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn refreshes_triggered(&self) -> u64 {
        self.refreshes_triggered.load(Ordering::Relaxed)
    }

    /// hits / (hits + misses); 0 when nothing was read
    pub fn hit_rate(&self) -> f64 {
        let hits = self.total_hits() as f64;
        let total = hits + self.misses() as f64;
        if total == 0.0 {
            0.0
        } else {
            hits / total
        }
    }

    pub fn record_read_latency(&self, duration: Duration) {
        let new_us = duration.as_micros() as u64;
        let alpha = 0.1; // EMA smoothing factor

        loop {
            let current = self.read_latency_us.load(Ordering::Relaxed);
            let updated = if current == 0 {
                new_us
            } else {
                ((1.0 - alpha) * current as f64 + alpha * new_us as f64) as u64
            };

            if self
                .read_latency_us
                .compare_exchange_weak(current, updated, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
            {
                break;
            }
        }
    }

    pub fn read_latency(&self) -> Duration {
        Duration::from_micros(self.read_latency_us.load(Ordering::Relaxed))
    }

    /// Snapshot the counters together with the current tier occupancy
    pub fn snapshot(&self, sizes: TierSizes, refresh_queue: RefreshQueueDepth) -> CacheStats {
        let l1_evictions = self.l1_evictions.load(Ordering::Relaxed);
        let l2_evictions = self.l2_evictions.load(Ordering::Relaxed);
        let l3_evictions = self.l3_evictions.load(Ordering::Relaxed);

        CacheStats {
            l1_hits: self.hits(CacheTier::L1),
            l2_hits: self.hits(CacheTier::L2),
            l3_hits: self.hits(CacheTier::L3),
            hits: self.total_hits(),
            misses: self.misses(),
            hit_rate: self.hit_rate(),
            l1_evictions,
            l2_evictions,
            l3_evictions,
            evictions: l1_evictions + l2_evictions + l3_evictions,
            compressions: self.compressions.load(Ordering::Relaxed),
            dropped_writes: self.dropped_writes.load(Ordering::Relaxed),
            corrupted_entries: self.corrupted_entries.load(Ordering::Relaxed),
            promotions: self.promotions.load(Ordering::Relaxed),
            refreshes_triggered: self.refreshes_triggered(),
            refreshes_completed: self.refreshes_completed.load(Ordering::Relaxed),
            refresh_failures: self.refresh_failures.load(Ordering::Relaxed),
            read_latency_us: self.read_latency_us.load(Ordering::Relaxed),
            sizes,
            refresh_queue,
        }
    }

    /// Reset all counters
    pub fn reset(&self) {
        for counter in [
            &self.l1_hits,
            &self.l2_hits,
            &self.l3_hits,
            &self.misses,
            &self.l1_evictions,
            &self.l2_evictions,
            &self.l3_evictions,
            &self.compressions,
            &self.dropped_writes,
            &self.corrupted_entries,
            &self.promotions,
            &self.refreshes_triggered,
            &self.refreshes_completed,
            &self.refresh_failures,
            &self.read_latency_us,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

/// Item count per tier (`None` when the tier is not configured)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TierSizes {
    pub l1: usize,
    pub l2: Option<usize>,
    pub l3: Option<usize>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RefreshQueueDepth {
    pub queued: usize,
    pub in_progress: usize,
}

/// Point-in-time cache statistics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    pub l1_hits: u64,
    pub l2_hits: u64,
    pub l3_hits: u64,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,

    pub l1_evictions: u64,
    pub l2_evictions: u64,
    pub l3_evictions: u64,
    pub evictions: u64,

    pub compressions: u64,
    pub dropped_writes: u64,
    pub corrupted_entries: u64,
    pub promotions: u64,

    pub refreshes_triggered: u64,
    pub refreshes_completed: u64,
    pub refresh_failures: u64,

    pub read_latency_us: u64,
    pub sizes: TierSizes,
    pub refresh_queue: RefreshQueueDepth,
}

/// Latency tracker helper
pub struct LatencyTracker {
    start: Instant,
}

impl LatencyTracker {
    /// Start tracking latency
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get elapsed duration
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_rate() {
        let metrics = CacheMetrics::new();
        assert_eq!(metrics.hit_rate(), 0.0);

        metrics.record_hit(CacheTier::L1);
        metrics.record_hit(CacheTier::L1);
        metrics.record_hit(CacheTier::L2);
        metrics.record_hit(CacheTier::L3);
        metrics.record_miss();

        assert_eq!(metrics.total_hits(), 4);
        assert!((metrics.hit_rate() - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_latency_ema() {
        let metrics = CacheMetrics::new();

        metrics.record_read_latency(Duration::from_micros(100));
        assert_eq!(metrics.read_latency(), Duration::from_micros(100));

        metrics.record_read_latency(Duration::from_micros(200));
        let latency = metrics.read_latency().as_micros();
        assert!(latency > 100 && latency < 200);
    }

    #[test]
    fn test_snapshot_totals() {
        let metrics = CacheMetrics::new();
        metrics.record_evictions(CacheTier::L1, 2);
        metrics.record_evictions(CacheTier::L2, 3);
        metrics.record_evictions(CacheTier::L3, 0);
        metrics.record_compression();
        metrics.record_refresh_triggered();
        metrics.record_refresh_failure();

        let stats = metrics.snapshot(
            TierSizes {
                l1: 4,
                l2: Some(7),
                l3: None,
            },
            RefreshQueueDepth {
                queued: 1,
                in_progress: 0,
            },
        );
        assert_eq!(stats.evictions, 5);
        assert_eq!(stats.compressions, 1);
        assert_eq!(stats.refreshes_triggered, 1);
        assert_eq!(stats.refresh_failures, 1);
        assert_eq!(stats.sizes.l2, Some(7));
        assert_eq!(stats.refresh_queue.queued, 1);
    }

    #[test]
    fn test_snapshot_serializes() {
        let metrics = CacheMetrics::new();
        metrics.record_hit(CacheTier::L2);

        let json = serde_json::to_value(metrics.snapshot(TierSizes::default(), Default::default()))
            .unwrap();
        assert_eq!(json["l2_hits"], 1);
        assert_eq!(json["sizes"]["l1"], 0);
        assert!(json["sizes"]["l3"].is_null());
    }

    #[test]
    fn test_reset() {
        let metrics = CacheMetrics::new();
        metrics.record_hit(CacheTier::L1);
        metrics.record_miss();
        metrics.record_promotion();

        metrics.reset();

        let stats = metrics.snapshot(TierSizes::default(), Default::default());
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 0);
        assert_eq!(stats.promotions, 0);
    }

    #[test]
    fn test_latency_tracker() {
        let tracker = LatencyTracker::start();
        std::thread::sleep(Duration::from_millis(5));
        assert!(tracker.elapsed() >= Duration::from_millis(5));
    }
}
