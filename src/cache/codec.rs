//! Record Codec
//!
//! Serializes entries for the persistent tiers.
//!
//! ```text
//! ┌───────┬───────────┬──────────────────────────────────────────┐
//! │ magic │ algorithm │ body (JSON record, LZ4 block if tagged)  │
//! │ 1B    │ 1B        │ ...                                      │
//! └───────┴───────────┴──────────────────────────────────────────┘
//! ```
//!
//! The JSON record holds the key, lifetime, metadata and payload. Any
//! failure to decode is reported as [`Error::Corrupted`].

use bytes::{BufMut, Bytes, BytesMut};
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::{Deserialize, Serialize};

use super::compression::{CompressionAlgorithm, CompressionManager};
use super::entry::{CacheEntry, EntryMetadata, Lifetime};
use super::CacheTier;
use crate::error::{Error, Result};

/// First byte of every stored record
pub const RECORD_MAGIC: u8 = 0xC7;

const HEADER_LEN: usize = 2;

#[derive(Serialize)]
struct RecordRef<'a, V> {
    key: &'a str,
    lifetime: Lifetime,
    metadata: &'a EntryMetadata,
    payload: &'a V,
}

#[derive(Deserialize)]
struct Record<V> {
    key: String,
    lifetime: Lifetime,
    #[serde(default)]
    metadata: EntryMetadata,
    payload: V,
}

/// Key and lifetime of a stored record, without the payload
#[derive(Debug, Clone, Deserialize)]
pub struct RecordHeader {
    pub key: String,
    pub lifetime: Lifetime,
    #[serde(default)]
    pub metadata: EntryMetadata,
    #[serde(default, rename = "payload")]
    _payload: IgnoredAny,
}

/// A serialized entry ready for a persistent tier
#[derive(Debug, Clone)]
pub struct EncodedEntry {
    /// Framed bytes as written to storage
    pub bytes: Bytes,
    /// Length of the JSON record before compression
    pub raw_len: usize,
    pub algorithm: CompressionAlgorithm,
    pub lifetime: Lifetime,
    pub metadata: EntryMetadata,
}

impl EncodedEntry {
    #[inline]
    pub fn is_compressed(&self) -> bool {
        self.algorithm != CompressionAlgorithm::None
    }
}

/// Encodes and decodes framed records
pub struct EntryCodec {
    compression: CompressionManager,
}

impl EntryCodec {
    pub fn new(compression_threshold: usize) -> Self {
        Self {
            compression: CompressionManager::with_threshold(compression_threshold),
        }
    }

    /// Whether a JSON record of `raw_len` bytes counts as large
    #[inline]
    pub fn is_large(&self, raw_len: usize) -> bool {
        self.compression.exceeds_threshold(raw_len)
    }

    /// Serialize an entry, compressing records above the threshold
    pub fn encode<V: Serialize>(&self, entry: &CacheEntry<V>) -> Result<EncodedEntry> {
        let record = RecordRef {
            key: entry.key(),
            lifetime: entry.lifetime(),
            metadata: entry.metadata(),
            payload: entry.payload(),
        };
        let json = serde_json::to_vec(&record)?;
        let (body, algorithm) = self.compression.compress(&json);

        let mut framed = BytesMut::with_capacity(HEADER_LEN + body.len());
        framed.put_u8(RECORD_MAGIC);
        framed.put_u8(algorithm.tag());
        framed.put_slice(&body);

        Ok(EncodedEntry {
            bytes: framed.freeze(),
            raw_len: json.len(),
            algorithm,
            lifetime: entry.lifetime(),
            metadata: entry.metadata().clone(),
        })
    }

    /// Decode a full entry stored under `key`
    pub fn decode<V: DeserializeOwned>(
        &self,
        tier: CacheTier,
        key: &str,
        bytes: &[u8],
    ) -> Result<CacheEntry<V>> {
        let json = self.unframe(tier, key, bytes)?;
        let record: Record<V> =
            serde_json::from_slice(&json).map_err(|e| corrupted(tier, key, e.to_string()))?;
        check_record(tier, key, &record.key, &record.lifetime)?;

        Ok(CacheEntry::with_lifetime(
            record.key,
            record.payload,
            record.lifetime,
            record.metadata,
        ))
    }

    /// Decode only the key, lifetime and metadata (used by eviction sweeps)
    pub fn decode_header(&self, tier: CacheTier, key: &str, bytes: &[u8]) -> Result<RecordHeader> {
        let json = self.unframe(tier, key, bytes)?;
        let header: RecordHeader =
            serde_json::from_slice(&json).map_err(|e| corrupted(tier, key, e.to_string()))?;
        check_record(tier, key, &header.key, &header.lifetime)?;
        Ok(header)
    }

    fn unframe(&self, tier: CacheTier, key: &str, bytes: &[u8]) -> Result<Bytes> {
        if bytes.len() < HEADER_LEN {
            return Err(corrupted(tier, key, "record shorter than header"));
        }
        if bytes[0] != RECORD_MAGIC {
            return Err(corrupted(tier, key, format!("bad magic 0x{:02x}", bytes[0])));
        }
        let algorithm = CompressionAlgorithm::from_tag(bytes[1])
            .ok_or_else(|| corrupted(tier, key, format!("unknown compression tag {}", bytes[1])))?;

        self.compression
            .decompress(&bytes[HEADER_LEN..], algorithm)
            .map_err(|e| corrupted(tier, key, e.to_string()))
    }
}

fn check_record(tier: CacheTier, key: &str, stored_key: &str, lifetime: &Lifetime) -> Result<()> {
    if stored_key != key {
        return Err(corrupted(
            tier,
            key,
            format!("record belongs to key '{}'", stored_key),
        ));
    }
    if !(lifetime.stored_at < lifetime.fresh_until && lifetime.fresh_until < lifetime.expires_at) {
        return Err(corrupted(tier, key, "inconsistent lifetime"));
    }
    Ok(())
}

fn corrupted(tier: CacheTier, key: &str, reason: impl Into<String>) -> Error {
    Error::Corrupted {
        tier,
        key: key.to_string(),
        reason: reason.into(),
    }
}
