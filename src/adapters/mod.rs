//! Infrastructure Adapters
//!
//! Implementations of the cache's outward-facing ports.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         TieredCache<V>                          │
//! │  ┌────────────────────────────────────────────────────────────┐ │
//! │  │            Ports: Fetcher<V> │ CacheStats                  │ │
//! │  └────────────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Adapters (This Module)                      │
//! │  ┌────────────────────────────────────────────────────────────┐ │
//! │  │        HttpOrigin        │      PrometheusExporter         │ │
//! │  └────────────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

mod exporter;
mod origin;

pub use exporter::PrometheusExporter;
pub use origin::{HttpOrigin, OriginConfig, DEFAULT_ORIGIN_TIMEOUT};
