//! Cache Manager - Unified Three-Tier Cache
//!
//! Orchestrates the L1, L2 and L3 tiers: tiered reads with promotion,
//! fan-out writes, invalidation, maintenance and background refresh.

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::codec::{EncodedEntry, EntryCodec};
use super::config::CacheConfig;
use super::entry::{CacheEntry, EntryMetadata, Priority};
use super::l1::{L1Cache, L1Lookup};
use super::l2::{L2Cache, L2Lookup, L2Store, MemoryL2Store};
use super::l3::{InMemoryL3Store, L3Cache, L3Lookup, L3Store};
use super::metrics::{CacheMetrics, CacheStats, LatencyTracker, RefreshQueueDepth, TierSizes};
use super::policy::{PlacementPolicy, RefreshPolicy, SweepPlan};
use super::refresh::{EnqueueOutcome, Fetcher, RefreshHandle, RefreshQueue, RefreshTask, SweepReport};
use super::CacheTier;
use crate::clock::{duration_millis, Clock, SystemClock};
use crate::error::Result;

/// Bounds required of cached values
pub trait CacheValue: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> CacheValue for T where T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}

/// Successful lookup
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheHit<V> {
    pub data: V,
    /// Tier that served the value
    pub source: CacheTier,
    /// `now < fresh_until` at read time
    pub fresh: bool,
}

/// Outcome of [`TieredCache::get_or_fetch`]
#[derive(Debug, Clone, PartialEq)]
pub enum Resolved<V> {
    /// Served from a tier
    Cached(CacheHit<V>),
    /// Fetched from the origin and written to the cache
    Fetched(V),
    /// Origin failed; served an expired copy from the stale window
    Stale(CacheHit<V>),
}

impl<V> Resolved<V> {
    pub fn into_value(self) -> V {
        match self {
            Resolved::Cached(hit) | Resolved::Stale(hit) => hit.data,
            Resolved::Fetched(value) => value,
        }
    }
}

/// Per-write options
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SetOptions {
    /// Overrides the configured default TTL
    pub ttl: Option<Duration>,
    pub metadata: EntryMetadata,
}

impl SetOptions {
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl: Some(ttl),
            ..Default::default()
        }
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.metadata.priority = priority;
        self
    }

    pub fn metadata(mut self, metadata: EntryMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Records removed by [`TieredCache::maintain`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MaintenanceReport {
    pub l2_expired: usize,
    pub l2_corrupted: usize,
    pub l3_expired: usize,
    pub l3_trimmed: usize,
}

// =============================================================================
// Builder
// =============================================================================

/// Assembles a [`TieredCache`] from a config and optional tier backends
pub struct TieredCacheBuilder<V> {
    config: CacheConfig,
    l2_store: Option<Arc<dyn L2Store>>,
    l3_store: Option<Arc<dyn L3Store>>,
    clock: Option<Arc<dyn Clock>>,
    _value: PhantomData<fn() -> V>,
}

impl<V: CacheValue> TieredCacheBuilder<V> {
    /// Enable L2 on top of `store`
    pub fn l2_store(mut self, store: Arc<dyn L2Store>) -> Self {
        self.l2_store = Some(store);
        self
    }

    /// Enable L3 on top of `store`
    pub fn l3_store(mut self, store: Arc<dyn L3Store>) -> Self {
        self.l3_store = Some(store);
        self
    }

    /// Replace the system clock
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Validate the configuration and build the cache
    pub fn build(self) -> Result<TieredCache<V>> {
        self.config.validate()?;
        let config = self.config;

        let codec = Arc::new(EntryCodec::new(config.compression_threshold));
        let l2 = self.l2_store.map(|store| {
            L2Cache::new(
                store,
                Arc::clone(&codec),
                config.namespace.clone(),
                config.l2_max_size,
                config.stale_ttl,
            )
        });
        let l3 = self.l3_store.map(|store| {
            L3Cache::new(
                store,
                Arc::clone(&codec),
                config.l3_max_size,
                config.stale_ttl,
                config.l3_maintenance_every,
            )
        });

        info!(
            l1_max_size = config.l1_max_size,
            l2 = l2.is_some(),
            l3 = l3.is_some(),
            default_ttl_ms = duration_millis(config.default_ttl),
            "Tiered cache initialized"
        );

        Ok(TieredCache {
            inner: Arc::new(Inner {
                clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
                l1: L1Cache::new(config.l1_max_size),
                l2,
                l3,
                codec,
                placement: PlacementPolicy {
                    large_record_bytes: config.compression_threshold,
                },
                refresh_policy: RefreshPolicy {
                    enabled: config.background_refresh,
                },
                refresh_queue: RefreshQueue::new(config.refresh_queue_capacity),
                metrics: CacheMetrics::new(),
                config,
            }),
        })
    }
}

// =============================================================================
// Tiered Cache
// =============================================================================

struct Inner<V> {
    config: CacheConfig,
    clock: Arc<dyn Clock>,
    l1: L1Cache<V>,
    l2: Option<L2Cache>,
    l3: Option<L3Cache>,
    codec: Arc<EntryCodec>,
    placement: PlacementPolicy,
    refresh_policy: RefreshPolicy,
    refresh_queue: RefreshQueue,
    metrics: CacheMetrics,
}

/// Unified tiered cache handle; clones share state
pub struct TieredCache<V> {
    inner: Arc<Inner<V>>,
}

impl<V> Clone for TieredCache<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V: CacheValue> TieredCache<V> {
    pub fn builder(config: CacheConfig) -> TieredCacheBuilder<V> {
        TieredCacheBuilder {
            config,
            l2_store: None,
            l3_store: None,
            clock: None,
            _value: PhantomData,
        }
    }

    /// All three tiers backed by in-memory stores
    pub fn in_memory(config: CacheConfig) -> Result<Self> {
        Self::builder(config)
            .l2_store(Arc::new(MemoryL2Store::new()))
            .l3_store(Arc::new(InMemoryL3Store::new()))
            .build()
    }

    /// Current time in epoch milliseconds from the injected clock
    pub fn now(&self) -> u64 {
        self.inner.clock.now_millis()
    }

    // =========================================================================
    // Read Path
    // =========================================================================

    /// Look up `key` across the tiers, promoting lower-tier hits
    #[instrument(skip(self), level = "debug")]
    pub async fn get(&self, key: &str) -> Option<CacheHit<V>> {
        let tracker = LatencyTracker::start();
        let result = self.lookup(key).await;
        self.inner.metrics.record_read_latency(tracker.elapsed());
        result
    }

    async fn lookup(&self, key: &str) -> Option<CacheHit<V>> {
        let inner = &self.inner;
        let now = self.now();

        match inner.l1.get(key, now) {
            L1Lookup::Hit(entry) => {
                inner.metrics.record_hit(CacheTier::L1);
                self.maybe_schedule_refresh(&entry, now);
                return Some(CacheHit {
                    data: entry.payload().clone(),
                    source: CacheTier::L1,
                    fresh: entry.is_fresh(now),
                });
            }
            L1Lookup::Expired => debug!(key, "L1 entry expired"),
            L1Lookup::Miss => {}
        }

        if let Some(l2) = &inner.l2 {
            match l2.get::<V>(key, now) {
                L2Lookup::Hit(entry) => {
                    inner.metrics.record_hit(CacheTier::L2);
                    let hit = CacheHit {
                        data: entry.payload().clone(),
                        source: CacheTier::L2,
                        fresh: entry.is_fresh(now),
                    };
                    self.promote_to_l1(entry, now);
                    return Some(hit);
                }
                L2Lookup::Corrupted => inner.metrics.record_corruption(1),
                L2Lookup::Stale(_) | L2Lookup::Expired | L2Lookup::Miss => {}
            }
        }

        if let Some(l3) = &inner.l3 {
            match l3.get::<V>(key, now).await {
                L3Lookup::Hit(entry) => {
                    inner.metrics.record_hit(CacheTier::L3);
                    let hit = CacheHit {
                        data: entry.payload().clone(),
                        source: CacheTier::L3,
                        fresh: entry.is_fresh(now),
                    };
                    self.promote_to_l2(&entry, now);
                    self.promote_to_l1(entry, now);
                    return Some(hit);
                }
                L3Lookup::Corrupted => inner.metrics.record_corruption(1),
                L3Lookup::Stale(_) | L3Lookup::Expired | L3Lookup::Miss => {}
            }
        }

        inner.metrics.record_miss();
        None
    }

    /// Like [`get`](Self::get) but also serves expired entries still inside
    /// the stale window. Never promotes and never counts hits.
    pub async fn get_stale(&self, key: &str) -> Option<CacheHit<V>> {
        let inner = &self.inner;
        let now = self.now();

        if let Some(entry) = inner.l1.peek(key) {
            if !entry.is_expired(now) {
                return Some(CacheHit {
                    data: entry.payload().clone(),
                    source: CacheTier::L1,
                    fresh: entry.is_fresh(now),
                });
            }
        }

        if let Some(l2) = &inner.l2 {
            match l2.get::<V>(key, now) {
                L2Lookup::Hit(entry) | L2Lookup::Stale(entry) => {
                    return Some(CacheHit {
                        fresh: entry.is_fresh(now),
                        source: CacheTier::L2,
                        data: entry.into_payload(),
                    });
                }
                L2Lookup::Corrupted => inner.metrics.record_corruption(1),
                L2Lookup::Expired | L2Lookup::Miss => {}
            }
        }

        if let Some(l3) = &inner.l3 {
            match l3.get::<V>(key, now).await {
                L3Lookup::Hit(entry) | L3Lookup::Stale(entry) => {
                    return Some(CacheHit {
                        fresh: entry.is_fresh(now),
                        source: CacheTier::L3,
                        data: entry.into_payload(),
                    });
                }
                L3Lookup::Corrupted => inner.metrics.record_corruption(1),
                L3Lookup::Expired | L3Lookup::Miss => {}
            }
        }

        None
    }

    /// Read-through: on a miss, fetch from `fetcher` and cache the result.
    ///
    /// If the fetch fails and a copy survives in the stale window, that copy
    /// is served instead of the error.
    #[instrument(skip(self, fetcher))]
    pub async fn get_or_fetch(&self, key: &str, fetcher: &dyn Fetcher<V>) -> Result<Resolved<V>> {
        if let Some(hit) = self.get(key).await {
            return Ok(Resolved::Cached(hit));
        }

        match fetcher.fetch(key).await {
            Ok(value) => {
                self.set(key, value.clone()).await;
                Ok(Resolved::Fetched(value))
            }
            Err(e) => match self.get_stale(key).await {
                Some(hit) => {
                    warn!(key, error = %e, "Origin fetch failed, serving stale entry");
                    Ok(Resolved::Stale(hit))
                }
                None => Err(e),
            },
        }
    }

    fn promote_to_l1(&self, entry: CacheEntry<V>, now: u64) {
        let key = entry.key().to_string();
        if let Some(evicted) = self.inner.l1.insert(entry, now) {
            self.inner.metrics.record_evictions(CacheTier::L1, 1);
            debug!(evicted = %evicted, "L1 eviction during promotion");
        }
        self.inner.metrics.record_promotion();
        debug!(key = %key, "Promoted entry to L1");
    }

    fn promote_to_l2(&self, entry: &CacheEntry<V>, now: u64) {
        let Some(l2) = &self.inner.l2 else {
            return;
        };
        match self.inner.codec.encode(entry) {
            Ok(encoded) => {
                if self.write_l2(l2, entry.key(), &encoded, now) {
                    self.inner.metrics.record_promotion();
                    debug!(key = entry.key(), "Promoted entry to L2");
                }
            }
            Err(e) => warn!(key = entry.key(), error = %e, "Failed to encode entry for L2 promotion"),
        }
    }

    fn maybe_schedule_refresh(&self, entry: &CacheEntry<V>, now: u64) {
        let lifetime = entry.lifetime();
        if !self.inner.refresh_policy.needs_refresh(&lifetime, now) {
            return;
        }

        let task = RefreshTask {
            key: entry.key().to_string(),
            enqueued_at: now,
            ttl: lifetime.ttl(),
            metadata: entry.metadata().clone(),
        };
        match self.inner.refresh_queue.enqueue(task) {
            EnqueueOutcome::Queued => {
                self.inner.metrics.record_refresh_triggered();
                debug!(key = entry.key(), "Queued background refresh");
            }
            EnqueueOutcome::Full => {
                debug!(key = entry.key(), "Refresh queue full, dropping request");
            }
            EnqueueOutcome::AlreadyQueued | EnqueueOutcome::InProgress => {}
        }
    }

    // =========================================================================
    // Write Path
    // =========================================================================

    /// Store `value` with the default TTL and metadata
    pub async fn set(&self, key: impl Into<String>, value: V) {
        self.set_with(key, value, SetOptions::default()).await
    }

    /// Store `value` in L1, in L2 when configured and in L3 when the record
    /// is high-priority or large
    #[instrument(skip_all, fields(key = tracing::field::Empty))]
    pub async fn set_with(&self, key: impl Into<String>, value: V, options: SetOptions) {
        let inner = &self.inner;
        let key = key.into();
        tracing::Span::current().record("key", key.as_str());

        let now = self.now();
        let ttl = options.ttl.unwrap_or(inner.config.default_ttl);
        let entry = CacheEntry::new(
            key.clone(),
            value,
            now,
            ttl,
            inner.config.background_refresh_threshold,
            options.metadata,
        );

        let encoded = if inner.l2.is_some() || inner.l3.is_some() {
            match inner.codec.encode(&entry) {
                Ok(encoded) => {
                    if encoded.is_compressed() {
                        inner.metrics.record_compression();
                    }
                    Some(encoded)
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "Serialization failed, entry kept in L1 only");
                    inner.metrics.record_dropped_write();
                    None
                }
            }
        } else {
            None
        };

        if let Some(evicted) = inner.l1.insert(entry, now) {
            inner.metrics.record_evictions(CacheTier::L1, 1);
            debug!(evicted = %evicted, "L1 eviction");
        }

        let Some(encoded) = encoded else {
            return;
        };

        if let Some(l2) = &inner.l2 {
            self.write_l2(l2, &key, &encoded, now);
        }

        if let Some(l3) = &inner.l3 {
            if inner.placement.admits_to_l3(&encoded.metadata, encoded.raw_len) {
                let (stored, maintenance_due) = l3.put(&key, &encoded).await;
                if !stored {
                    inner.metrics.record_dropped_write();
                }
                if maintenance_due {
                    self.spawn_l3_maintenance();
                }
            } else {
                // An earlier high-priority or large version must not outlive this write
                l3.delete(&key).await;
            }
        }
    }

    /// Write to L2, recording sweep results; returns whether it was stored
    fn write_l2(&self, l2: &L2Cache, key: &str, encoded: &EncodedEntry, now: u64) -> bool {
        let outcome = l2.put(key, encoded, now);
        self.record_l2_sweep(&outcome.swept);
        if !outcome.stored {
            self.inner.metrics.record_dropped_write();
            l2.remove(key);
        }
        outcome.stored
    }

    fn record_l2_sweep(&self, plan: &SweepPlan) {
        let metrics = &self.inner.metrics;
        metrics.record_evictions(
            CacheTier::L2,
            (plan.expired.len() + plan.overflow.len()) as u64,
        );
        if !plan.corrupted.is_empty() {
            metrics.record_corruption(plan.corrupted.len() as u64);
        }
    }

    /// Remove `key` from every tier and drop any pending refresh for it
    #[instrument(skip(self))]
    pub async fn delete(&self, key: &str) -> bool {
        let inner = &self.inner;
        let mut removed = inner.l1.remove(key).is_some();
        if let Some(l2) = &inner.l2 {
            removed |= l2.remove(key);
        }
        if let Some(l3) = &inner.l3 {
            removed |= l3.delete(key).await;
        }
        inner.refresh_queue.cancel(key);
        removed
    }

    /// Empty every tier and the refresh queue
    #[instrument(skip(self))]
    pub async fn clear(&self) {
        let inner = &self.inner;
        inner.l1.clear();
        if let Some(l2) = &inner.l2 {
            l2.clear();
        }
        if let Some(l3) = &inner.l3 {
            l3.clear().await;
        }
        let dropped = inner.refresh_queue.clear_pending();
        info!(dropped_refreshes = dropped, "Cache cleared");
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    /// Run the L2 expiry sweep and the L3 expiry and capacity sweep
    #[instrument(skip(self))]
    pub async fn maintain(&self) -> MaintenanceReport {
        let inner = &self.inner;
        let now = self.now();
        let mut report = MaintenanceReport::default();

        if let Some(l2) = &inner.l2 {
            let plan = l2.maintain(now);
            self.record_l2_sweep(&plan);
            report.l2_expired = plan.expired.len() + plan.overflow.len();
            report.l2_corrupted = plan.corrupted.len();
        }

        if let Some(l3) = &inner.l3 {
            match l3.maintain(now).await {
                Ok(l3_report) => {
                    inner.metrics.record_evictions(
                        CacheTier::L3,
                        (l3_report.expired + l3_report.trimmed) as u64,
                    );
                    report.l3_expired = l3_report.expired;
                    report.l3_trimmed = l3_report.trimmed;
                }
                Err(e) => warn!(error = %e, "L3 maintenance failed"),
            }
        }

        report
    }

    fn spawn_l3_maintenance(&self) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let cache = self.clone();
        runtime.spawn(async move {
            let Some(l3) = &cache.inner.l3 else {
                return;
            };
            match l3.maintain(cache.now()).await {
                Ok(report) => cache.inner.metrics.record_evictions(
                    CacheTier::L3,
                    (report.expired + report.trimmed) as u64,
                ),
                Err(e) => warn!(error = %e, "Scheduled L3 maintenance failed"),
            }
        });
    }

    // =========================================================================
    // Background Refresh
    // =========================================================================

    /// Refresh up to `refresh_batch_size` queued keys concurrently
    pub async fn refresh_sweep(&self, fetcher: &dyn Fetcher<V>) -> SweepReport {
        let inner = &self.inner;
        let batch = inner.refresh_queue.take_batch(inner.config.refresh_batch_size);
        if batch.is_empty() {
            return SweepReport::default();
        }

        let results = join_all(batch.iter().map(|task| fetcher.fetch(&task.key))).await;

        let mut report = SweepReport {
            attempted: batch.len(),
            ..Default::default()
        };
        for (task, result) in batch.into_iter().zip(results) {
            // Deleted or cleared while the fetch was in flight
            if !inner.refresh_queue.complete(&task.key) {
                debug!(key = %task.key, "Discarding refresh of deleted key");
                report.discarded += 1;
                continue;
            }
            match result {
                Ok(value) => {
                    let options = SetOptions {
                        ttl: Some(task.ttl),
                        metadata: task.metadata,
                    };
                    self.set_with(task.key, value, options).await;
                    inner.metrics.record_refresh_completed();
                    report.refreshed += 1;
                }
                Err(e) => {
                    warn!(key = %task.key, error = %e, "Background refresh failed");
                    inner.metrics.record_refresh_failure();
                    report.failed += 1;
                }
            }
        }

        debug!(
            attempted = report.attempted,
            refreshed = report.refreshed,
            failed = report.failed,
            discarded = report.discarded,
            "Refresh sweep finished"
        );
        report
    }

    /// Start the periodic refresh sweep on the current runtime
    pub fn spawn_refresher(&self, fetcher: Arc<dyn Fetcher<V>>) -> RefreshHandle {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let cache = self.clone();
        let period = self.inner.config.refresh_interval;

        let join = tokio::spawn(async move {
            info!(interval_ms = duration_millis(period), "Starting background refresher");

            let mut tick = interval_at(Instant::now() + period, period);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        info!("Background refresher shutting down");
                        break;
                    }
                    _ = tick.tick() => {
                        cache.refresh_sweep(fetcher.as_ref()).await;
                    }
                }
            }
        });

        RefreshHandle::new(cancel, join)
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    /// Snapshot counters and tier occupancy
    pub async fn stats(&self) -> CacheStats {
        let inner = &self.inner;
        let l3 = match &inner.l3 {
            Some(l3) => Some(l3.len().await),
            None => None,
        };
        let sizes = TierSizes {
            l1: inner.l1.len(),
            l2: inner.l2.as_ref().map(L2Cache::len),
            l3,
        };
        let queue = RefreshQueueDepth {
            queued: inner.refresh_queue.queued_len(),
            in_progress: inner.refresh_queue.in_progress_len(),
        };
        inner.metrics.snapshot(sizes, queue)
    }

    /// Zero every counter
    pub fn reset_stats(&self) {
        self.inner.metrics.reset();
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.inner.clock
    }

    pub fn l1(&self) -> &L1Cache<V> {
        &self.inner.l1
    }

    pub fn l2(&self) -> Option<&L2Cache> {
        self.inner.l2.as_ref()
    }

    pub fn l3(&self) -> Option<&L3Cache> {
        self.inner.l3.as_ref()
    }

    pub fn refresh_queue(&self) -> &RefreshQueue {
        &self.inner.refresh_queue
    }
}

// =============================================================================
// Tests
// =============================================================================
