//! Three-Tiered Cache
//!
//! In-memory L1, persistent key-value L2 and persistent structured L3 tiers
//! behind a single read-through/write-through handle.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────────┐
//! │                           TieredCache<V>                                 │
//! ├──────────────────────────────────────────────────────────────────────────┤
//! │  L1 (memory)          │ L2 (key-value)       │ L3 (structured)           │
//! │  ┌────────────────┐   │ ┌────────────────┐   │ ┌────────────────────┐    │
//! │  │ LRU map        │   │ │ L2Store        │   │ │ L3Store            │    │
//! │  │ decoded values │   │ │ framed records │   │ │ + expiry index     │    │
//! │  └────────────────┘   │ └────────────────┘   │ └────────────────────┘    │
//! │         ▲             │         │            │           │               │
//! │         └──── promotion (copy-up) on read ───┴───────────┘               │
//! │                                                                          │
//! │              RefreshQueue ──▶ refresh sweep ──▶ Fetcher<V>               │
//! └──────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Reads check L1, then L2, then L3. Writes always land in L1, in L2 when
//! configured, and in L3 only for high-priority or large records.

pub mod codec;
pub mod compression;
pub mod config;
pub mod entry;
pub mod l1;
pub mod l2;
pub mod l3;
mod manager;
pub mod metrics;
pub mod policy;
pub mod refresh;

#[cfg(test)]
mod proptest;

use serde::Serialize;

pub use codec::{EncodedEntry, EntryCodec};
pub use compression::{CompressionAlgorithm, CompressionManager};
pub use config::CacheConfig;
pub use entry::{CacheEntry, EntryMetadata, Lifetime, Priority};
pub use l1::L1Cache;
pub use l2::{FileL2Store, L2Cache, L2Store, MemoryL2Store};
pub use l3::{InMemoryL3Store, L3Cache, L3Record, L3Store};
pub use manager::{
    CacheHit, CacheValue, MaintenanceReport, Resolved, SetOptions, TieredCache,
    TieredCacheBuilder,
};
pub use metrics::{CacheMetrics, CacheStats};
pub use refresh::{FnFetcher, Fetcher, RefreshHandle, RefreshQueue, RefreshTask, SweepReport};

/// Cache tier enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CacheTier {
    /// In-memory hot tier
    L1,
    /// Persistent key-value tier
    L2,
    /// Persistent structured tier
    L3,
}

impl std::fmt::Display for CacheTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheTier::L1 => write!(f, "L1"),
            CacheTier::L2 => write!(f, "L2"),
            CacheTier::L3 => write!(f, "L3"),
        }
    }
}
