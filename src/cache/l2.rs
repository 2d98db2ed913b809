//! L2 Cache - Persistent Key-Value Tier
//!
//! Synchronous byte store holding framed records under a namespace prefix.
//!
//! # Design
//!
//! - [`L2Store`] is the raw storage seam (in-memory map or one file per key)
//! - [`L2Cache`] adds the namespace, the item bound and the two-phase sweep
//! - Stores report capacity pressure as [`Error::QuotaExceeded`]; the tier
//!   sweeps once and retries before dropping the write

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;

use super::codec::{EncodedEntry, EntryCodec};
use super::entry::CacheEntry;
use super::policy::{plan_l2_sweep, SweepCandidate, SweepPlan};
use super::CacheTier;
use crate::error::{Error, Result};

/// File extension for records written by [`FileL2Store`]
const RECORD_EXT: &str = "l2";

// =============================================================================
// Store Trait
// =============================================================================

/// Synchronous persistent key-value storage
pub trait L2Store: Send + Sync {
    /// Read the raw bytes stored under `key`
    fn get(&self, key: &str) -> Result<Option<Bytes>>;

    /// Store `value` under `key`, replacing any previous value
    fn put(&self, key: &str, value: Bytes) -> Result<()>;

    /// Remove `key`; returns whether it was present
    fn remove(&self, key: &str) -> Result<bool>;

    /// All stored keys
    fn keys(&self) -> Result<Vec<String>>;
}

// =============================================================================
// In-Memory Store
// =============================================================================

/// In-memory [`L2Store`] with an optional byte quota
pub struct MemoryL2Store {
    entries: DashMap<String, Bytes>,
    quota_bytes: Option<u64>,
    used_bytes: AtomicU64,
    /// Serializes the quota check with the insert
    write_lock: Mutex<()>,
}

impl MemoryL2Store {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            quota_bytes: None,
            used_bytes: AtomicU64::new(0),
            write_lock: Mutex::new(()),
        }
    }

    /// Store that rejects writes pushing total value bytes past `quota_bytes`
    pub fn with_quota(quota_bytes: u64) -> Self {
        Self {
            quota_bytes: Some(quota_bytes),
            ..Self::new()
        }
    }

    pub fn used_bytes(&self) -> u64 {
        self.used_bytes.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for MemoryL2Store {
    fn default() -> Self {
        Self::new()
    }
}

impl L2Store for MemoryL2Store {
    fn get(&self, key: &str) -> Result<Option<Bytes>> {
        Ok(self.entries.get(key).map(|v| v.value().clone()))
    }

    fn put(&self, key: &str, value: Bytes) -> Result<()> {
        let _guard = self.write_lock.lock();
        let new_len = value.len() as u64;
        let old_len = self.entries.get(key).map(|v| v.len() as u64).unwrap_or(0);

        if let Some(quota) = self.quota_bytes {
            let projected = self.used_bytes().saturating_sub(old_len) + new_len;
            if projected > quota {
                return Err(Error::QuotaExceeded(format!(
                    "memory store needs {} bytes, quota is {}",
                    projected, quota
                )));
            }
        }

        if let Some(old) = self.entries.insert(key.to_string(), value) {
            self.used_bytes.fetch_sub(old.len() as u64, Ordering::Relaxed);
        }
        self.used_bytes.fetch_add(new_len, Ordering::Relaxed);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool> {
        let _guard = self.write_lock.lock();
        match self.entries.remove(key) {
            Some((_, old)) => {
                self.used_bytes.fetch_sub(old.len() as u64, Ordering::Relaxed);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn keys(&self) -> Result<Vec<String>> {
        Ok(self.entries.iter().map(|e| e.key().clone()).collect())
    }
}

// =============================================================================
// File Store
// =============================================================================

/// Directory-backed [`L2Store`]: one file per key, survives restarts.
///
/// File names are the URL-encoded key plus a `.l2` extension. Writes go to a
/// temporary file first and are renamed into place.
pub struct FileL2Store {
    dir: PathBuf,
    quota_bytes: Option<u64>,
    used_bytes: AtomicU64,
    /// Held across the quota check, the rename and the byte accounting
    write_lock: Mutex<()>,
}

impl FileL2Store {
    /// Open (creating if needed) a store rooted at `dir`
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        Self::open_with_quota(dir, None)
    }

    /// Open a store that keeps the total record bytes under `quota_bytes`
    pub fn open_with_quota(dir: impl Into<PathBuf>, quota_bytes: Option<u64>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;

        let mut used = 0u64;
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            if Self::key_from_file_name(&entry.file_name().to_string_lossy()).is_some() {
                used += entry.metadata()?.len();
            }
        }

        tracing::info!(dir = %dir.display(), used_bytes = used, "Opened file-backed L2 store");

        Ok(Self {
            dir,
            quota_bytes,
            used_bytes: AtomicU64::new(used),
            write_lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn used_bytes(&self) -> u64 {
        self.used_bytes.load(Ordering::Relaxed)
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir
            .join(format!("{}.{}", urlencoding::encode(key), RECORD_EXT))
    }

    fn key_from_file_name(name: &str) -> Option<String> {
        let encoded = name.strip_suffix(RECORD_EXT)?.strip_suffix('.')?;
        urlencoding::decode(encoded).ok().map(|k| k.into_owned())
    }

    fn file_len(path: &Path) -> Result<Option<u64>> {
        match fs::metadata(path) {
            Ok(meta) => Ok(Some(meta.len())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

impl L2Store for FileL2Store {
    fn get(&self, key: &str) -> Result<Option<Bytes>> {
        match fs::read(self.path_for(key)) {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn put(&self, key: &str, value: Bytes) -> Result<()> {
        let _guard = self.write_lock.lock();
        let path = self.path_for(key);
        let old_len = Self::file_len(&path)?.unwrap_or(0);
        let new_len = value.len() as u64;

        if let Some(quota) = self.quota_bytes {
            let projected = self.used_bytes().saturating_sub(old_len) + new_len;
            if projected > quota {
                return Err(Error::QuotaExceeded(format!(
                    "{} needs {} bytes, quota is {}",
                    self.dir.display(),
                    projected,
                    quota
                )));
            }
        }

        let tmp = self.dir.join(format!(".{}.tmp", uuid::Uuid::new_v4()));
        let written = fs::File::create(&tmp).and_then(|mut file| {
            file.write_all(&value)?;
            file.sync_data()
        });
        if let Err(e) = written.and_then(|_| fs::rename(&tmp, &path)) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }

        self.used_bytes.fetch_sub(
            old_len.min(self.used_bytes()),
            Ordering::Relaxed,
        );
        self.used_bytes.fetch_add(new_len, Ordering::Relaxed);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool> {
        let _guard = self.write_lock.lock();
        let path = self.path_for(key);
        let Some(len) = Self::file_len(&path)? else {
            return Ok(false);
        };
        match fs::remove_file(&path) {
            Ok(()) => {
                self.used_bytes
                    .fetch_sub(len.min(self.used_bytes()), Ordering::Relaxed);
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn keys(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if let Some(key) = Self::key_from_file_name(&entry.file_name().to_string_lossy()) {
                keys.push(key);
            }
        }
        Ok(keys)
    }
}

// =============================================================================
// L2 Tier
// =============================================================================

/// Result of an L2 lookup
#[derive(Debug)]
pub enum L2Lookup<V> {
    /// Unexpired entry
    Hit(CacheEntry<V>),
    /// Expired but inside the stale retention window
    Stale(CacheEntry<V>),
    /// Expired past retention; removed
    Expired,
    /// Undecodable; removed
    Corrupted,
    Miss,
}

/// Outcome of an L2 write
#[derive(Debug, Default)]
pub struct L2PutOutcome {
    /// Record reached the store
    pub stored: bool,
    /// Records removed to make room
    pub swept: SweepPlan,
}

/// L2 Cache - persistent key-value tier
pub struct L2Cache {
    store: Arc<dyn L2Store>,
    codec: Arc<EntryCodec>,
    namespace: String,
    max_entries: usize,
    stale_ttl: Duration,
    /// Makes the bound check, sweep and write of one `put` atomic
    write_lock: Mutex<()>,
}

impl L2Cache {
    pub fn new(
        store: Arc<dyn L2Store>,
        codec: Arc<EntryCodec>,
        namespace: impl Into<String>,
        max_entries: usize,
        stale_ttl: Duration,
    ) -> Self {
        Self {
            store,
            codec,
            namespace: namespace.into(),
            max_entries: max_entries.max(1),
            stale_ttl,
            write_lock: Mutex::new(()),
        }
    }

    fn store_key(&self, key: &str) -> String {
        format!("{}{}", self.namespace, key)
    }

    /// Look up `key` at `now`.
    ///
    /// Corrupted records and records past retention are removed. Store
    /// failures are logged and reported as a miss.
    pub fn get<V: DeserializeOwned>(&self, key: &str, now: u64) -> L2Lookup<V> {
        let store_key = self.store_key(key);
        let raw = match self.store.get(&store_key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return L2Lookup::Miss,
            Err(e) => {
                tracing::warn!(key, error = %e, "L2 read failed, treating as miss");
                return L2Lookup::Miss;
            }
        };

        let entry: CacheEntry<V> = match self.codec.decode(CacheTier::L2, key, &raw) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(key, error = %e, "Dropping corrupted L2 entry");
                self.remove_raw(&store_key);
                return L2Lookup::Corrupted;
            }
        };

        if !entry.is_expired(now) {
            return L2Lookup::Hit(entry);
        }
        if entry.lifetime().is_retained(now, self.stale_ttl) {
            return L2Lookup::Stale(entry);
        }

        self.remove_raw(&store_key);
        L2Lookup::Expired
    }

    /// Write an encoded record, sweeping first if a new key would overflow
    /// the bound. A quota failure triggers one sweep and one retry.
    ///
    /// Concurrent writers are serialized so the bound holds after every put.
    pub fn put(&self, key: &str, encoded: &EncodedEntry, now: u64) -> L2PutOutcome {
        let _guard = self.write_lock.lock();
        let store_key = self.store_key(key);
        let mut outcome = L2PutOutcome::default();

        let is_new = !matches!(self.store.get(&store_key), Ok(Some(_)));
        if is_new {
            let len = self.len();
            if len >= self.max_entries {
                outcome.swept = self.sweep(now, self.max_entries - 1);
            }
        }

        match self.store.put(&store_key, encoded.bytes.clone()) {
            Ok(()) => outcome.stored = true,
            Err(e) if e.is_quota() => {
                let len = self.len();
                let target = len.saturating_sub((len / 10).max(1));
                tracing::debug!(key, target, "L2 quota exceeded, sweeping before retry");
                let retry_sweep = self.sweep(now, target);
                merge_plans(&mut outcome.swept, retry_sweep);

                match self.store.put(&store_key, encoded.bytes.clone()) {
                    Ok(()) => outcome.stored = true,
                    Err(e) => {
                        tracing::warn!(key, error = %e, "L2 write dropped after quota retry");
                    }
                }
            }
            Err(e) => {
                tracing::warn!(key, error = %e, "L2 write failed");
            }
        }

        outcome
    }

    /// Remove `key`; returns whether it was present
    pub fn remove(&self, key: &str) -> bool {
        self.remove_raw(&self.store_key(key))
    }

    fn remove_raw(&self, store_key: &str) -> bool {
        match self.store.remove(store_key) {
            Ok(removed) => removed,
            Err(e) => {
                tracing::warn!(key = store_key, error = %e, "L2 remove failed");
                false
            }
        }
    }

    /// Keys in this namespace (namespace prefix stripped)
    pub fn keys(&self) -> Vec<String> {
        match self.store.keys() {
            Ok(keys) => keys
                .into_iter()
                .filter_map(|k| k.strip_prefix(&self.namespace).map(str::to_string))
                .collect(),
            Err(e) => {
                tracing::warn!(error = %e, "L2 key listing failed");
                Vec::new()
            }
        }
    }

    pub fn len(&self) -> usize {
        self.keys().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.max_entries
    }

    /// Remove every key in this namespace
    pub fn clear(&self) -> usize {
        self.keys().iter().filter(|key| self.remove(key)).count()
    }

    /// Two-phase sweep down to `target_len` entries
    pub fn sweep(&self, now: u64, target_len: usize) -> SweepPlan {
        let candidates: Vec<SweepCandidate> = self
            .keys()
            .into_iter()
            .filter_map(|key| {
                let raw = match self.store.get(&self.store_key(&key)) {
                    Ok(Some(raw)) => raw,
                    _ => return None,
                };
                Some(match self.codec.decode_header(CacheTier::L2, &key, &raw) {
                    Ok(header) => SweepCandidate::Valid {
                        key,
                        lifetime: header.lifetime,
                    },
                    Err(e) => {
                        tracing::warn!(key = %key, error = %e, "Corrupted L2 entry found during sweep");
                        SweepCandidate::Corrupted { key }
                    }
                })
            })
            .collect();

        let plan = plan_l2_sweep(candidates, now, self.stale_ttl, target_len);
        for key in plan.keys() {
            self.remove(key);
        }

        if !plan.is_empty() {
            tracing::debug!(
                expired = plan.expired.len(),
                corrupted = plan.corrupted.len(),
                overflow = plan.overflow.len(),
                "L2 sweep removed entries"
            );
        }
        plan
    }

    /// Expiry-only sweep (keeps up to the configured bound)
    pub fn maintain(&self, now: u64) -> SweepPlan {
        self.sweep(now, self.max_entries)
    }
}

fn merge_plans(into: &mut SweepPlan, other: SweepPlan) {
    into.expired.extend(other.expired);
    into.corrupted.extend(other.corrupted);
    into.overflow.extend(other.overflow);
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::entry::EntryMetadata;

    fn codec() -> Arc<EntryCodec> {
        Arc::new(EntryCodec::new(1024))
    }

    fn encode(codec: &EntryCodec, key: &str, value: u32, now: u64, ttl_ms: u64) -> EncodedEntry {
        let entry = CacheEntry::new(
            key,
            value,
            now,
            Duration::from_millis(ttl_ms),
            0.8,
            EntryMetadata::default(),
        );
        codec.encode(&entry).unwrap()
    }

    fn tier(store: Arc<dyn L2Store>, max: usize, stale_ttl: Duration) -> L2Cache {
        L2Cache::new(store, codec(), "test:", max, stale_ttl)
    }

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("tiered-cache-l2-{}", uuid::Uuid::new_v4()))
    }

    #[test]
    fn test_memory_store_quota() {
        let store = MemoryL2Store::with_quota(10);
        store.put("a", Bytes::from_static(b"123456")).unwrap();
        assert_eq!(store.used_bytes(), 6);

        let err = store.put("b", Bytes::from_static(b"123456")).unwrap_err();
        assert!(err.is_quota());

        // Replacing an existing key only counts the delta
        store.put("a", Bytes::from_static(b"1234567890")).unwrap();
        assert_eq!(store.used_bytes(), 10);

        assert!(store.remove("a").unwrap());
        assert_eq!(store.used_bytes(), 0);
        assert!(!store.remove("a").unwrap());
    }

    #[test]
    fn test_file_store_persists_across_reopen() {
        let dir = temp_dir();
        {
            let store = FileL2Store::open(&dir).unwrap();
            store.put("ns:team/138", Bytes::from_static(b"payload")).unwrap();
            assert_eq!(store.keys().unwrap(), vec!["ns:team/138".to_string()]);
        }

        let reopened = FileL2Store::open(&dir).unwrap();
        assert_eq!(reopened.used_bytes(), 7);
        assert_eq!(
            reopened.get("ns:team/138").unwrap(),
            Some(Bytes::from_static(b"payload"))
        );
        assert!(reopened.remove("ns:team/138").unwrap());
        assert_eq!(reopened.get("ns:team/138").unwrap(), None);
        assert_eq!(reopened.used_bytes(), 0);

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_file_store_quota() {
        let dir = temp_dir();
        let store = FileL2Store::open_with_quota(&dir, Some(8)).unwrap();

        store.put("a", Bytes::from_static(b"12345")).unwrap();
        assert!(store.put("b", Bytes::from_static(b"12345")).unwrap_err().is_quota());
        assert_eq!(store.get("b").unwrap(), None);

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_l2_hit_and_namespace() {
        let store = Arc::new(MemoryL2Store::new());
        let l2 = tier(store.clone(), 10, Duration::ZERO);
        let codec = codec();

        let outcome = l2.put("k", &encode(&codec, "k", 7, 0, 1_000), 0);
        assert!(outcome.stored);
        assert!(store.get("test:k").unwrap().is_some());

        match l2.get::<u32>("k", 10) {
            L2Lookup::Hit(entry) => assert_eq!(*entry.payload(), 7),
            other => panic!("expected hit, got {:?}", other),
        }
        assert_eq!(l2.keys(), vec!["k".to_string()]);
    }

    #[test]
    fn test_l2_expired_removed() {
        let store = Arc::new(MemoryL2Store::new());
        let l2 = tier(store, 10, Duration::ZERO);
        let codec = codec();

        l2.put("k", &encode(&codec, "k", 7, 0, 100), 0);
        assert!(matches!(l2.get::<u32>("k", 150), L2Lookup::Expired));
        assert!(l2.is_empty());
    }

    #[test]
    fn test_l2_stale_window() {
        let store = Arc::new(MemoryL2Store::new());
        let l2 = tier(store, 10, Duration::from_millis(100));
        let codec = codec();

        l2.put("k", &encode(&codec, "k", 7, 0, 100), 0);
        assert!(matches!(l2.get::<u32>("k", 150), L2Lookup::Stale(_)));
        assert_eq!(l2.len(), 1);
        assert!(matches!(l2.get::<u32>("k", 200), L2Lookup::Expired));
    }

    #[test]
    fn test_l2_corrupted_removed() {
        let store = Arc::new(MemoryL2Store::new());
        let l2 = tier(store.clone(), 10, Duration::ZERO);

        store.put("test:bad", Bytes::from_static(b"garbage")).unwrap();
        assert!(matches!(l2.get::<u32>("bad", 0), L2Lookup::Corrupted));
        assert!(store.get("test:bad").unwrap().is_none());
    }

    #[test]
    fn test_l2_bound_evicts_oldest() {
        let store = Arc::new(MemoryL2Store::new());
        let l2 = tier(store, 2, Duration::ZERO);
        let codec = codec();

        l2.put("a", &encode(&codec, "a", 1, 10, 10_000), 10);
        l2.put("b", &encode(&codec, "b", 2, 20, 10_000), 20);
        let outcome = l2.put("c", &encode(&codec, "c", 3, 30, 10_000), 30);

        assert_eq!(outcome.swept.overflow, vec!["a".to_string()]);
        assert_eq!(l2.len(), 2);
        assert!(matches!(l2.get::<u32>("a", 30), L2Lookup::Miss));
    }

    #[test]
    fn test_l2_bound_prefers_expired() {
        let store = Arc::new(MemoryL2Store::new());
        let l2 = tier(store, 2, Duration::ZERO);
        let codec = codec();

        l2.put("old", &encode(&codec, "old", 1, 10, 10_000), 10);
        l2.put("short", &encode(&codec, "short", 2, 20, 5), 20);
        let outcome = l2.put("new", &encode(&codec, "new", 3, 30, 10_000), 30);

        assert_eq!(outcome.swept.expired, vec!["short".to_string()]);
        assert!(outcome.swept.overflow.is_empty());
        assert!(matches!(l2.get::<u32>("old", 30), L2Lookup::Hit(_)));
    }

    #[test]
    fn test_l2_overwrite_does_not_sweep() {
        let store = Arc::new(MemoryL2Store::new());
        let l2 = tier(store, 1, Duration::ZERO);
        let codec = codec();

        l2.put("a", &encode(&codec, "a", 1, 0, 10_000), 0);
        let outcome = l2.put("a", &encode(&codec, "a", 2, 1, 10_000), 1);
        assert!(outcome.swept.is_empty());
        assert_eq!(l2.len(), 1);
    }

    #[test]
    fn test_l2_quota_retry_then_drop() {
        let codec = codec();
        let record = encode(&codec, "a", 1, 0, 10_000);
        let record_len = record.bytes.len() as u64;

        // Room for exactly one record: the retry sweep frees it
        let store = Arc::new(MemoryL2Store::with_quota(record_len + 4));
        let l2 = tier(store.clone(), 100, Duration::ZERO);
        assert!(l2.put("a", &record, 0).stored);

        let outcome = l2.put("b", &encode(&codec, "b", 2, 1, 10_000), 1);
        assert!(outcome.stored);
        assert_eq!(outcome.swept.overflow, vec!["a".to_string()]);

        // A record that can never fit is dropped
        let tiny = Arc::new(MemoryL2Store::with_quota(4));
        let l2 = tier(tiny, 100, Duration::ZERO);
        assert!(!l2.put("a", &record, 0).stored);
        assert!(l2.is_empty());
    }

    #[test]
    fn test_l2_bound_holds_under_concurrent_writers() {
        let store = Arc::new(MemoryL2Store::new());
        let l2 = tier(store, 4, Duration::ZERO);
        let codec = codec();

        std::thread::scope(|scope| {
            for t in 0..8u32 {
                let (l2, codec) = (&l2, &codec);
                scope.spawn(move || {
                    for i in 0..25u32 {
                        let key = format!("t{}-{}", t, i);
                        let now = u64::from(i);
                        l2.put(&key, &encode(codec, &key, i, now, 10_000), now);
                        assert!(l2.len() <= 4);
                    }
                });
            }
        });

        assert_eq!(l2.len(), 4);
    }

    #[test]
    fn test_file_store_quota_under_concurrent_writers() {
        let dir = temp_dir();
        let store = FileL2Store::open_with_quota(&dir, Some(50)).unwrap();

        std::thread::scope(|scope| {
            for t in 0..8 {
                let store = &store;
                scope.spawn(move || {
                    for i in 0..10 {
                        let _ = store.put(&format!("t{}-{}", t, i), Bytes::from_static(b"0123456789"));
                    }
                });
            }
        });

        assert_eq!(store.keys().unwrap().len(), 5);
        assert_eq!(store.used_bytes(), 50);

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_l2_clear_respects_namespace() {
        let store = Arc::new(MemoryL2Store::new());
        store.put("other:x", Bytes::from_static(b"keep")).unwrap();
        let l2 = tier(store.clone(), 10, Duration::ZERO);
        let codec = codec();

        l2.put("a", &encode(&codec, "a", 1, 0, 10_000), 0);
        l2.put("b", &encode(&codec, "b", 2, 0, 10_000), 0);
        assert_eq!(l2.clear(), 2);
        assert_eq!(l2.clear(), 0);
        assert!(store.get("other:x").unwrap().is_some());
    }

    #[test]
    fn test_l2_maintain_drops_expired() {
        let store = Arc::new(MemoryL2Store::new());
        let l2 = tier(store, 10, Duration::ZERO);
        let codec = codec();

        l2.put("a", &encode(&codec, "a", 1, 0, 100), 0);
        l2.put("b", &encode(&codec, "b", 2, 0, 10_000), 0);

        let plan = l2.maintain(500);
        assert_eq!(plan.expired, vec!["a".to_string()]);
        assert_eq!(l2.keys(), vec!["b".to_string()]);
    }
}
