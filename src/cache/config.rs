//! Cache Configuration
//!
//! Named options controlling tier capacities, TTLs, freshness and the
//! background refresher. Durations are expressed in milliseconds when loaded
//! from YAML.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Cache configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    /// Bound on the hot tier item count
    pub l1_max_size: usize,
    /// Bound on the persistent key-value tier item count
    pub l2_max_size: usize,
    /// Bound on the structured tier item count (enforced by maintenance)
    pub l3_max_size: usize,
    /// Default expiry window
    #[serde(with = "duration_ms", rename = "default_ttl_ms")]
    pub default_ttl: Duration,
    /// Extra retention for expired entries in the persistent tiers
    #[serde(with = "duration_ms", rename = "stale_ttl_ms")]
    pub stale_ttl: Duration,
    /// Fraction of the TTL after which an entry is stale (0 < ratio < 1)
    pub background_refresh_threshold: f64,
    /// Serialized size (bytes) above which records are compressed
    pub compression_threshold: usize,
    /// Enqueue stale L1 hits for background refresh
    pub background_refresh: bool,
    /// Refresh sweep period
    #[serde(with = "duration_ms", rename = "refresh_interval_ms")]
    pub refresh_interval: Duration,
    /// Keys refreshed per sweep
    pub refresh_batch_size: usize,
    /// Maximum pending refresh tasks
    pub refresh_queue_capacity: usize,
    /// Run L3 maintenance after this many L3 writes
    pub l3_maintenance_every: u64,
    /// Key prefix inside the persistent key-value store
    pub namespace: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            l1_max_size: 100,
            l2_max_size: 1_000,
            l3_max_size: 10_000,
            default_ttl: Duration::from_secs(300),
            stale_ttl: Duration::ZERO,
            background_refresh_threshold: 0.8,
            compression_threshold: 1024,
            background_refresh: true,
            refresh_interval: Duration::from_secs(10),
            refresh_batch_size: 3,
            refresh_queue_capacity: 1_000,
            l3_maintenance_every: 10,
            namespace: "tiered_cache:".to_string(),
        }
    }
}

impl CacheConfig {
    /// Load configuration from a YAML file, falling back to defaults for
    /// missing keys.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&raw)
    }

    /// Parse configuration from a YAML document.
    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        let config: CacheConfig = serde_yaml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that would break the cache invariants.
    pub fn validate(&self) -> Result<()> {
        let ratio = self.background_refresh_threshold;
        if !(ratio > 0.0 && ratio < 1.0) {
            return Err(Error::Config(format!(
                "background_refresh_threshold must be in (0, 1), got {}",
                ratio
            )));
        }
        if self.l1_max_size == 0 {
            return Err(Error::Config("l1_max_size must be at least 1".into()));
        }
        if self.l2_max_size == 0 {
            return Err(Error::Config("l2_max_size must be at least 1".into()));
        }
        if self.l3_max_size == 0 {
            return Err(Error::Config("l3_max_size must be at least 1".into()));
        }
        if self.default_ttl.is_zero() {
            return Err(Error::Config("default_ttl must be non-zero".into()));
        }
        if self.refresh_interval.is_zero() {
            return Err(Error::Config("refresh_interval must be non-zero".into()));
        }
        if self.refresh_batch_size == 0 {
            return Err(Error::Config(
                "refresh_batch_size must be at least 1".into(),
            ));
        }
        if self.l3_maintenance_every == 0 {
            return Err(Error::Config(
                "l3_maintenance_every must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Serde adapter storing a `Duration` as integer milliseconds.
mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(crate::clock::duration_millis(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_defaults_are_valid() {
        let config = CacheConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.compression_threshold, 1024);
        assert_eq!(config.refresh_batch_size, 3);
        assert_eq!(config.refresh_interval, Duration::from_secs(10));
    }

    #[test]
    fn test_ratio_bounds() {
        for ratio in [0.0, 1.0, -0.5, 1.5, f64::NAN] {
            let config = CacheConfig {
                background_refresh_threshold: ratio,
                ..Default::default()
            };
            assert_matches!(config.validate(), Err(Error::Config(_)));
        }
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let config = CacheConfig {
            l1_max_size: 0,
            ..Default::default()
        };
        assert_matches!(config.validate(), Err(Error::Config(_)));
    }

    #[test]
    fn test_yaml_partial_override() {
        let yaml = "l1_max_size: 2\ndefault_ttl_ms: 5000\nnamespace: \"blaze:\"\n";
        let config = CacheConfig::from_yaml_str(yaml).unwrap();

        assert_eq!(config.l1_max_size, 2);
        assert_eq!(config.default_ttl, Duration::from_millis(5000));
        assert_eq!(config.namespace, "blaze:");
        // Untouched keys keep their defaults
        assert_eq!(config.l2_max_size, 1_000);
    }

    #[test]
    fn test_yaml_unknown_key_rejected() {
        let result = CacheConfig::from_yaml_str("l4_max_size: 3\n");
        assert_matches!(result, Err(Error::ConfigParse(_)));
    }

    #[test]
    fn test_yaml_invalid_value_rejected() {
        let result = CacheConfig::from_yaml_str("background_refresh_threshold: 1.2\n");
        assert_matches!(result, Err(Error::Config(_)));
    }
}
