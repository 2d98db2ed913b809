//! L3 Cache - Structured Store Tier
//!
//! Asynchronous tier for large or high-priority entries.
//!
//! # Design
//!
//! - Pluggable [`L3Store`] backend keyed by cache key
//! - Each record carries `stored_at` and `expires_at` so the backend can keep
//!   an expiry index
//! - Expiry and capacity are enforced by [`L3Cache::maintain`], not on write

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;

use super::codec::{EncodedEntry, EntryCodec};
use super::entry::CacheEntry;
use super::CacheTier;
use crate::clock::duration_millis;
use crate::error::Result;

/// Keys fetched per expiry-index query during maintenance
const MAINTENANCE_BATCH: usize = 256;

/// Stored L3 record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct L3Record {
    pub key: String,
    pub stored_at: u64,
    pub expires_at: u64,
    /// Framed record bytes
    pub data: Bytes,
}

/// L3 storage backend trait
#[async_trait]
pub trait L3Store: Send + Sync {
    /// Get a record by key
    async fn get(&self, key: &str) -> Result<Option<L3Record>>;

    /// Insert or replace a record
    async fn put(&self, record: L3Record) -> Result<()>;

    /// Delete a record
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Number of stored records
    async fn count(&self) -> Result<usize>;

    /// Remove every record
    async fn clear(&self) -> Result<()>;

    /// Up to `limit` keys with `expires_at < before`, earliest first
    async fn keys_expiring_before(&self, before: u64, limit: usize) -> Result<Vec<String>>;

    /// Get storage statistics
    fn stats(&self) -> L3StoreStats;
}

/// L3 backend statistics
#[derive(Debug, Clone, Default)]
pub struct L3StoreStats {
    /// Total records stored
    pub record_count: u64,
    /// Total bytes stored
    pub total_bytes: u64,
    /// Read operations
    pub reads: u64,
    /// Write operations
    pub writes: u64,
    /// Delete operations
    pub deletes: u64,
}

// =============================================================================
// In-Memory Store
// =============================================================================

/// In-memory [`L3Store`] with an ordered expiry index
#[derive(Default)]
pub struct InMemoryL3Store {
    records: DashMap<String, L3Record>,
    /// (expires_at, key); mutated together with `records`
    expiry_index: Mutex<BTreeSet<(u64, String)>>,
    total_bytes: AtomicU64,
    reads: AtomicU64,
    writes: AtomicU64,
    deletes: AtomicU64,
}

impl InMemoryL3Store {
    pub fn new() -> Self {
        Self::default()
    }

    fn remove_locked(&self, index: &mut BTreeSet<(u64, String)>, key: &str) -> bool {
        match self.records.remove(key) {
            Some((_, old)) => {
                index.remove(&(old.expires_at, old.key));
                self.total_bytes
                    .fetch_sub(old.data.len() as u64, Ordering::Relaxed);
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl L3Store for InMemoryL3Store {
    async fn get(&self, key: &str) -> Result<Option<L3Record>> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        Ok(self.records.get(key).map(|r| r.value().clone()))
    }

    async fn put(&self, record: L3Record) -> Result<()> {
        self.writes.fetch_add(1, Ordering::Relaxed);

        let mut index = self.expiry_index.lock();
        self.remove_locked(&mut index, &record.key);

        index.insert((record.expires_at, record.key.clone()));
        self.total_bytes
            .fetch_add(record.data.len() as u64, Ordering::Relaxed);
        self.records.insert(record.key.clone(), record);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        self.deletes.fetch_add(1, Ordering::Relaxed);
        let mut index = self.expiry_index.lock();
        Ok(self.remove_locked(&mut index, key))
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.records.len())
    }

    async fn clear(&self) -> Result<()> {
        let mut index = self.expiry_index.lock();
        index.clear();
        self.records.clear();
        self.total_bytes.store(0, Ordering::Relaxed);
        Ok(())
    }

    async fn keys_expiring_before(&self, before: u64, limit: usize) -> Result<Vec<String>> {
        let index = self.expiry_index.lock();
        Ok(index
            .iter()
            .take_while(|(expires_at, _)| *expires_at < before)
            .take(limit)
            .map(|(_, key)| key.clone())
            .collect())
    }

    fn stats(&self) -> L3StoreStats {
        L3StoreStats {
            record_count: self.records.len() as u64,
            total_bytes: self.total_bytes.load(Ordering::Relaxed),
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
        }
    }
}

// =============================================================================
// L3 Tier
// =============================================================================

/// Result of an L3 lookup
#[derive(Debug)]
pub enum L3Lookup<V> {
    Hit(CacheEntry<V>),
    /// Expired but inside the stale retention window
    Stale(CacheEntry<V>),
    /// Expired past retention; removed
    Expired,
    /// Undecodable; removed
    Corrupted,
    Miss,
}

/// Records removed by one maintenance pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct L3Maintenance {
    pub expired: usize,
    pub trimmed: usize,
}

/// L3 Cache - structured store tier
pub struct L3Cache {
    store: Arc<dyn L3Store>,
    codec: Arc<EntryCodec>,
    max_entries: usize,
    stale_ttl: Duration,
    maintenance_every: u64,
    writes_since_maintenance: AtomicU64,
}

impl L3Cache {
    pub fn new(
        store: Arc<dyn L3Store>,
        codec: Arc<EntryCodec>,
        max_entries: usize,
        stale_ttl: Duration,
        maintenance_every: u64,
    ) -> Self {
        Self {
            store,
            codec,
            max_entries: max_entries.max(1),
            stale_ttl,
            maintenance_every: maintenance_every.max(1),
            writes_since_maintenance: AtomicU64::new(0),
        }
    }

    /// Look up `key` at `now`; failures are logged and reported as a miss
    pub async fn get<V: DeserializeOwned>(&self, key: &str, now: u64) -> L3Lookup<V> {
        let record = match self.store.get(key).await {
            Ok(Some(record)) => record,
            Ok(None) => return L3Lookup::Miss,
            Err(e) => {
                tracing::warn!(key, error = %e, "L3 read failed, treating as miss");
                return L3Lookup::Miss;
            }
        };

        let entry: CacheEntry<V> = match self.codec.decode(CacheTier::L3, key, &record.data) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(key, error = %e, "Dropping corrupted L3 entry");
                self.delete(key).await;
                return L3Lookup::Corrupted;
            }
        };

        if !entry.is_expired(now) {
            return L3Lookup::Hit(entry);
        }
        if entry.lifetime().is_retained(now, self.stale_ttl) {
            return L3Lookup::Stale(entry);
        }

        self.delete(key).await;
        L3Lookup::Expired
    }

    /// Write an encoded record.
    ///
    /// Returns `(stored, maintenance_due)`; maintenance falls due every
    /// `maintenance_every` successful writes.
    pub async fn put(&self, key: &str, encoded: &EncodedEntry) -> (bool, bool) {
        let record = L3Record {
            key: key.to_string(),
            stored_at: encoded.lifetime.stored_at,
            expires_at: encoded.lifetime.expires_at,
            data: encoded.bytes.clone(),
        };

        if let Err(e) = self.store.put(record).await {
            tracing::warn!(key, error = %e, "L3 write dropped");
            return (false, false);
        }

        let writes = self.writes_since_maintenance.fetch_add(1, Ordering::Relaxed) + 1;
        (true, writes % self.maintenance_every == 0)
    }

    pub async fn delete(&self, key: &str) -> bool {
        match self.store.delete(key).await {
            Ok(removed) => removed,
            Err(e) => {
                tracing::warn!(key, error = %e, "L3 delete failed");
                false
            }
        }
    }

    pub async fn clear(&self) {
        if let Err(e) = self.store.clear().await {
            tracing::warn!(error = %e, "L3 clear failed");
        }
    }

    pub async fn len(&self) -> usize {
        match self.store.count().await {
            Ok(count) => count,
            Err(e) => {
                tracing::warn!(error = %e, "L3 count failed");
                0
            }
        }
    }

    pub fn capacity(&self) -> usize {
        self.max_entries
    }

    /// Expiry sweep through the index, then trim earliest-expiring records
    /// down to the bound.
    pub async fn maintain(&self, now: u64) -> Result<L3Maintenance> {
        let mut report = L3Maintenance::default();

        // Past retention means expires_at + stale_ttl <= now
        let cutoff = now
            .saturating_sub(duration_millis(self.stale_ttl))
            .saturating_add(1);
        loop {
            let keys = self
                .store
                .keys_expiring_before(cutoff, MAINTENANCE_BATCH)
                .await?;
            let batch = keys.len();
            for key in keys {
                if self.store.delete(&key).await? {
                    report.expired += 1;
                }
            }
            if batch < MAINTENANCE_BATCH {
                break;
            }
        }

        let count = self.store.count().await?;
        if count > self.max_entries {
            let excess = count - self.max_entries;
            let victims = self.store.keys_expiring_before(u64::MAX, excess).await?;
            for key in victims {
                if self.store.delete(&key).await? {
                    report.trimmed += 1;
                }
            }
        }

        self.writes_since_maintenance.store(0, Ordering::Relaxed);
        if report != L3Maintenance::default() {
            tracing::debug!(
                expired = report.expired,
                trimmed = report.trimmed,
                "L3 maintenance removed records"
            );
        }
        Ok(report)
    }

    pub fn store_stats(&self) -> L3StoreStats {
        self.store.stats()
    }
}

// =============================================================================
// Tests
// =============================================================================
