//! Tiered Cache - Three-Tier Cache Engine
//!
//! A read-through/write-through cache spanning an in-memory LRU tier (L1), a
//! persistent key-value tier (L2) and a persistent structured tier (L3), with
//! per-entry TTLs, a freshness window and background refresh of stale hot keys.
//!
//! # Architecture
//!
//! ```text
//! get ──▶ L1 ──miss──▶ L2 ──miss──▶ L3 ──miss──▶ None
//!          ▲            │            │
//!          └── promote ─┴── promote ─┘
//!
//! stale L1 hit ──▶ RefreshQueue ──▶ refresh sweep ──▶ Fetcher ──▶ set
//! ```
//!
//! # Modules
//!
//! - [`cache`] - Tiers, entry codec, policies, refresh and statistics
//! - [`adapters`] - HTTP origin fetcher and Prometheus exporter
//! - [`server`] - HTTP front end used by the `tiered-cache` binary
//! - [`clock`] - Injectable time source
//! - [`error`] - Error types

pub mod adapters;
pub mod cache;
pub mod clock;
pub mod error;
pub mod server;

// Re-export commonly used types
pub use cache::{
    CacheConfig, CacheHit, CacheStats, CacheTier, EntryMetadata, Fetcher, FnFetcher, Priority,
    Resolved, SetOptions, TieredCache,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{Error, Result};
