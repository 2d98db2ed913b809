//! Cache Entry Types
//!
//! An entry carries its payload plus three timestamps: when it was stored,
//! until when it is fresh, and when it expires.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::clock::duration_millis;

/// Smallest TTL that leaves room for a distinct freshness point.
pub const MIN_TTL_MS: u64 = 2;

/// Placement hint supplied by the caller
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    /// Always persisted to the structured tier
    High,
}

impl std::str::FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "normal" => Ok(Priority::Normal),
            "high" => Ok(Priority::High),
            other => Err(format!("unknown priority '{}'", other)),
        }
    }
}

/// Caller-supplied tags influencing tier placement
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryMetadata {
    #[serde(default)]
    pub priority: Priority,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
}

impl EntryMetadata {
    /// Metadata with only a priority set
    pub fn with_priority(priority: Priority) -> Self {
        Self {
            priority,
            tags: BTreeMap::new(),
        }
    }

    /// Add a tag
    pub fn tag(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(name.into(), value.into());
        self
    }

    #[inline]
    pub fn is_high_priority(&self) -> bool {
        self.priority == Priority::High
    }
}

/// The three timestamps governing an entry's lifetime (epoch milliseconds).
///
/// `stored_at < fresh_until < expires_at` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lifetime {
    pub stored_at: u64,
    pub fresh_until: u64,
    pub expires_at: u64,
}

impl Lifetime {
    /// Compute the lifetime of an entry written at `now`.
    ///
    /// The TTL is raised to [`MIN_TTL_MS`] and the freshness offset is
    /// `round(ttl * ratio)` clamped into `[1, ttl - 1]`.
    pub fn new(now: u64, ttl: Duration, freshness_ratio: f64) -> Self {
        let ttl_ms = duration_millis(ttl).max(MIN_TTL_MS);
        let offset = ((ttl_ms as f64) * freshness_ratio).round() as u64;
        let offset = offset.clamp(1, ttl_ms - 1);

        Self {
            stored_at: now,
            fresh_until: now.saturating_add(offset),
            expires_at: now.saturating_add(ttl_ms),
        }
    }

    /// Original TTL of the entry
    #[inline]
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.expires_at - self.stored_at)
    }

    #[inline]
    pub fn is_expired(&self, now: u64) -> bool {
        now >= self.expires_at
    }

    #[inline]
    pub fn is_fresh(&self, now: u64) -> bool {
        now < self.fresh_until
    }

    /// Expired, but still inside the extra retention window
    #[inline]
    pub fn is_retained(&self, now: u64, stale_ttl: Duration) -> bool {
        now < self.expires_at.saturating_add(duration_millis(stale_ttl))
    }
}

/// Cache entry containing the payload and its lifetime
pub struct CacheEntry<V> {
    key: String,
    payload: V,
    lifetime: Lifetime,
    metadata: EntryMetadata,
    /// Last read timestamp (epoch millis), drives LRU in L1
    last_accessed: AtomicU64,
}

impl<V> CacheEntry<V> {
    /// Create a new entry written at `now`
    pub fn new(
        key: impl Into<String>,
        payload: V,
        now: u64,
        ttl: Duration,
        freshness_ratio: f64,
        metadata: EntryMetadata,
    ) -> Self {
        Self::with_lifetime(
            key,
            payload,
            Lifetime::new(now, ttl, freshness_ratio),
            metadata,
        )
    }

    /// Rebuild an entry from a persisted lifetime (for tier transfers)
    pub fn with_lifetime(
        key: impl Into<String>,
        payload: V,
        lifetime: Lifetime,
        metadata: EntryMetadata,
    ) -> Self {
        Self {
            key: key.into(),
            payload,
            last_accessed: AtomicU64::new(lifetime.stored_at),
            lifetime,
            metadata,
        }
    }

    #[inline]
    pub fn key(&self) -> &str {
        &self.key
    }

    #[inline]
    pub fn payload(&self) -> &V {
        &self.payload
    }

    pub fn into_payload(self) -> V {
        self.payload
    }

    #[inline]
    pub fn lifetime(&self) -> Lifetime {
        self.lifetime
    }

    #[inline]
    pub fn stored_at(&self) -> u64 {
        self.lifetime.stored_at
    }

    #[inline]
    pub fn fresh_until(&self) -> u64 {
        self.lifetime.fresh_until
    }

    #[inline]
    pub fn expires_at(&self) -> u64 {
        self.lifetime.expires_at
    }

    #[inline]
    pub fn metadata(&self) -> &EntryMetadata {
        &self.metadata
    }

    /// Record a read at `now`
    #[inline]
    pub fn record_access(&self, now: u64) {
        self.last_accessed.store(now, Ordering::Relaxed);
    }

    #[inline]
    pub fn last_accessed(&self) -> u64 {
        self.last_accessed.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn is_expired(&self, now: u64) -> bool {
        self.lifetime.is_expired(now)
    }

    #[inline]
    pub fn is_fresh(&self, now: u64) -> bool {
        self.lifetime.is_fresh(now)
    }
}

impl<V: Clone> Clone for CacheEntry<V> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            payload: self.payload.clone(),
            lifetime: self.lifetime,
            metadata: self.metadata.clone(),
            last_accessed: AtomicU64::new(self.last_accessed()),
        }
    }
}

impl<V> std::fmt::Debug for CacheEntry<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheEntry")
            .field("key", &self.key)
            .field("lifetime", &self.lifetime)
            .field("priority", &self.metadata.priority)
            .field("last_accessed", &self.last_accessed())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
