//! Eviction and Placement Policies
//!
//! Pure decision logic shared by the tiers: which entry L1 drops, which
//! records an L2 sweep removes, and which writes are allowed into L3.

use std::time::Duration;

use super::entry::{EntryMetadata, Lifetime};

/// Recency snapshot of one L1 slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Recency {
    /// Last read or write timestamp (epoch millis)
    pub last_accessed: u64,
    /// Monotonic touch counter, orders accesses within the same millisecond
    pub seq: u64,
}

/// Strict LRU: the candidate with the oldest `last_accessed` loses.
pub fn lru_victim<'a, I>(candidates: I) -> Option<&'a str>
where
    I: IntoIterator<Item = (&'a str, Recency)>,
{
    candidates
        .into_iter()
        .min_by_key(|(_, recency)| (recency.last_accessed, recency.seq))
        .map(|(key, _)| key)
}

/// What the persistent tier knows about a stored record during a sweep
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SweepCandidate {
    /// Record decoded; carries its lifetime
    Valid { key: String, lifetime: Lifetime },
    /// Record failed to decode
    Corrupted { key: String },
}

impl SweepCandidate {
    pub fn key(&self) -> &str {
        match self {
            SweepCandidate::Valid { key, .. } | SweepCandidate::Corrupted { key } => key,
        }
    }
}

/// Removal plan produced by [`plan_l2_sweep`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepPlan {
    /// Expired past retention
    pub expired: Vec<String>,
    /// Undecodable records
    pub corrupted: Vec<String>,
    /// Oldest-by-`stored_at` records dropped to restore the bound
    pub overflow: Vec<String>,
}

impl SweepPlan {
    pub fn len(&self) -> usize {
        self.expired.len() + self.corrupted.len() + self.overflow.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.expired
            .iter()
            .chain(self.corrupted.iter())
            .chain(self.overflow.iter())
            .map(String::as_str)
    }
}

/// Two-phase L2 sweep.
///
/// Phase one removes every corrupted record and every record past
/// `expires_at + stale_ttl`. Phase two removes the oldest survivors by
/// `stored_at` until at most `target_len` remain.
pub fn plan_l2_sweep(
    candidates: Vec<SweepCandidate>,
    now: u64,
    stale_ttl: Duration,
    target_len: usize,
) -> SweepPlan {
    let mut plan = SweepPlan::default();
    let mut survivors: Vec<(String, u64)> = Vec::with_capacity(candidates.len());

    for candidate in candidates {
        match candidate {
            SweepCandidate::Corrupted { key } => plan.corrupted.push(key),
            SweepCandidate::Valid { key, lifetime } => {
                if lifetime.is_retained(now, stale_ttl) {
                    survivors.push((key, lifetime.stored_at));
                } else {
                    plan.expired.push(key);
                }
            }
        }
    }

    if survivors.len() > target_len {
        survivors.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        let excess = survivors.len() - target_len;
        plan.overflow = survivors.into_iter().take(excess).map(|(key, _)| key).collect();
    }

    plan
}

/// Decides which writes reach the structured tier
#[derive(Debug, Clone, Copy)]
pub struct PlacementPolicy {
    /// Records strictly larger than this are "large"
    pub large_record_bytes: usize,
}

impl PlacementPolicy {
    /// L3 only takes high-priority or large records
    pub fn admits_to_l3(&self, metadata: &EntryMetadata, raw_len: usize) -> bool {
        metadata.is_high_priority() || raw_len > self.large_record_bytes
    }
}

/// Decides when an L1 hit should trigger a background refresh
#[derive(Debug, Clone, Copy)]
pub struct RefreshPolicy {
    pub enabled: bool,
}

impl RefreshPolicy {
    /// Entry crossed its freshness point but has not expired
    pub fn needs_refresh(&self, lifetime: &Lifetime, now: u64) -> bool {
        self.enabled && !lifetime.is_fresh(now) && !lifetime.is_expired(now)
    }
}

// =============================================================================
// Tests
// =============================================================================
