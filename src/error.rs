//! Error types for the tiered cache

use thiserror::Error;

use crate::cache::CacheTier;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the tiered cache
#[derive(Error, Debug)]
#[allow(clippy::enum_variant_names)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration file could not be parsed
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(#[from] serde_yaml::Error),

    // =========================================================================
    // Storage Tier Errors
    // =========================================================================
    /// Stored entry could not be decoded
    #[error("Corrupted entry '{key}' in {tier}: {reason}")]
    Corrupted {
        tier: CacheTier,
        key: String,
        reason: String,
    },

    /// Quota exceeded
    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    /// Payload serialization failed
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    // =========================================================================
    // Compression Errors
    // =========================================================================
    /// Compression failed
    #[error("Compression with {algorithm} failed: {reason}")]
    CompressionFailed { algorithm: String, reason: String },

    /// Decompression failed
    #[error("Decompression with {algorithm} failed: {reason}")]
    DecompressionFailed { algorithm: String, reason: String },

    // =========================================================================
    // Refresh / Origin Errors
    // =========================================================================
    /// Origin fetch failed for a key
    #[error("Fetch failed for key {key}: {reason}")]
    Fetch { key: String, reason: String },

    /// Origin connection error
    #[error("Origin connection error: {0}")]
    Origin(#[source] reqwest::Error),

    /// Origin returned a non-success status
    #[error("Origin returned {status} for key {key}")]
    OriginStatus { key: String, status: u16 },

    // =========================================================================
    // Metrics Errors
    // =========================================================================
    /// Prometheus registry error
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
}

impl Error {
    /// Whether the error signals a storage quota/capacity failure
    pub fn is_quota(&self) -> bool {
        matches!(self, Error::QuotaExceeded(_))
    }
}
