//! Record Compression
//!
//! LZ4 block compression for serialized records above a size threshold,
//! falling back to the raw bytes whenever compression does not help.
//!
//! # Example
//!
//! ```
//! use tiered_cache::cache::compression::{CompressionAlgorithm, CompressionManager};
//!
//! let manager = CompressionManager::with_threshold(16);
//!
//! let data = b"wins wins wins wins wins wins wins wins wins wins";
//! let (compressed, algorithm) = manager.compress(data);
//! assert_eq!(algorithm, CompressionAlgorithm::Lz4);
//!
//! let restored = manager.decompress(&compressed, algorithm).unwrap();
//! assert_eq!(restored.as_ref(), data);
//! ```

use bytes::Bytes;

use crate::error::{Error, Result};

/// Upper bound on a single decompressed record (64MB)
pub const MAX_DECOMPRESSED_SIZE: usize = 64 * 1024 * 1024;

// =============================================================================
// Compression Algorithm
// =============================================================================

/// Supported compression algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CompressionAlgorithm {
    /// Stored as-is
    None,
    /// LZ4 block format with prepended size
    #[default]
    Lz4,
}

impl CompressionAlgorithm {
    /// Human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            CompressionAlgorithm::None => "none",
            CompressionAlgorithm::Lz4 => "lz4",
        }
    }

    /// One-byte tag written in front of every stored record
    pub fn tag(&self) -> u8 {
        match self {
            CompressionAlgorithm::None => 0,
            CompressionAlgorithm::Lz4 => 1,
        }
    }

    /// Inverse of [`tag`](Self::tag)
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(CompressionAlgorithm::None),
            1 => Some(CompressionAlgorithm::Lz4),
            _ => None,
        }
    }
}

impl std::fmt::Display for CompressionAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

// =============================================================================
// Compressor Trait
// =============================================================================

/// Trait for compression implementations
pub trait Compressor: Send + Sync {
    fn algorithm(&self) -> CompressionAlgorithm;

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>>;

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>>;
}

/// Pass-through compressor
pub struct NoopCompressor;

impl Compressor for NoopCompressor {
    fn algorithm(&self) -> CompressionAlgorithm {
        CompressionAlgorithm::None
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }
}

/// LZ4 compressor
pub struct Lz4Compressor;

impl Compressor for Lz4Compressor {
    fn algorithm(&self) -> CompressionAlgorithm {
        CompressionAlgorithm::Lz4
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        lz4::block::compress(data, Some(lz4::block::CompressionMode::DEFAULT), true).map_err(
            |e| Error::CompressionFailed {
                algorithm: "LZ4".into(),
                reason: e.to_string(),
            },
        )
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        // The block is prefixed with its little-endian decompressed size
        let declared = match data.get(..4) {
            Some(prefix) => u32::from_le_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]),
            None => {
                return Err(Error::DecompressionFailed {
                    algorithm: "LZ4".into(),
                    reason: "truncated size prefix".into(),
                })
            }
        };
        if declared as usize > MAX_DECOMPRESSED_SIZE {
            return Err(Error::DecompressionFailed {
                algorithm: "LZ4".into(),
                reason: format!("declared size {} exceeds limit", declared),
            });
        }

        lz4::block::decompress(data, None).map_err(|e| Error::DecompressionFailed {
            algorithm: "LZ4".into(),
            reason: e.to_string(),
        })
    }
}

// =============================================================================
// Compression Manager
// =============================================================================

/// Applies compression above a size threshold
pub struct CompressionManager {
    threshold: usize,
    noop: NoopCompressor,
    lz4: Lz4Compressor,
}

impl CompressionManager {
    /// Compress records strictly larger than `threshold` bytes
    pub fn with_threshold(threshold: usize) -> Self {
        Self {
            threshold,
            noop: NoopCompressor,
            lz4: Lz4Compressor,
        }
    }

    fn compressor(&self, algorithm: CompressionAlgorithm) -> &dyn Compressor {
        match algorithm {
            CompressionAlgorithm::None => &self.noop,
            CompressionAlgorithm::Lz4 => &self.lz4,
        }
    }

    /// Whether a record of `len` bytes is a compression candidate
    #[inline]
    pub fn exceeds_threshold(&self, len: usize) -> bool {
        len > self.threshold
    }

    /// Compress `data` if it exceeds the threshold.
    ///
    /// Returns `(bytes, algorithm_used)`; falls back to the raw bytes if
    /// compression fails or does not shrink the record.
    pub fn compress(&self, data: &[u8]) -> (Bytes, CompressionAlgorithm) {
        if !self.exceeds_threshold(data.len()) {
            return (Bytes::copy_from_slice(data), CompressionAlgorithm::None);
        }

        match self.lz4.compress(data) {
            Ok(compressed) if compressed.len() < data.len() => {
                (Bytes::from(compressed), CompressionAlgorithm::Lz4)
            }
            Ok(_) => (Bytes::copy_from_slice(data), CompressionAlgorithm::None),
            Err(e) => {
                tracing::warn!("Compression failed, storing uncompressed: {}", e);
                (Bytes::copy_from_slice(data), CompressionAlgorithm::None)
            }
        }
    }

    /// Reverse [`compress`](Self::compress)
    pub fn decompress(&self, data: &[u8], algorithm: CompressionAlgorithm) -> Result<Bytes> {
        let decompressed = self.compressor(algorithm).decompress(data)?;
        Ok(Bytes::from(decompressed))
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }
}

impl Default for CompressionManager {
    fn default() -> Self {
        Self::with_threshold(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_DATA: &[u8] = b"{\"team\":\"Cardinals\",\"wins\":90,\"losses\":72} \
        {\"team\":\"Cardinals\",\"wins\":90,\"losses\":72} \
        {\"team\":\"Cardinals\",\"wins\":90,\"losses\":72}";

    #[test]
    fn test_lz4_compressor_shrinks_repetitive_data() {
        let compressor = Lz4Compressor;
        let compressed = compressor.compress(TEST_DATA).unwrap();
        assert!(compressed.len() < TEST_DATA.len());
        assert_eq!(compressor.decompress(&compressed).unwrap(), TEST_DATA);
    }

    #[test]
    fn test_below_threshold_is_untouched() {
        let manager = CompressionManager::default();
        let (result, algorithm) = manager.compress(TEST_DATA);

        assert_eq!(algorithm, CompressionAlgorithm::None);
        assert_eq!(result.as_ref(), TEST_DATA);
    }

    #[test]
    fn test_threshold_is_exclusive() {
        let manager = CompressionManager::with_threshold(TEST_DATA.len());
        assert!(!manager.exceeds_threshold(TEST_DATA.len()));
        assert!(manager.exceeds_threshold(TEST_DATA.len() + 1));
    }

    #[test]
    fn test_above_threshold_compresses() {
        let manager = CompressionManager::with_threshold(32);
        let (compressed, algorithm) = manager.compress(TEST_DATA);

        assert_eq!(algorithm, CompressionAlgorithm::Lz4);
        let restored = manager.decompress(&compressed, algorithm).unwrap();
        assert_eq!(restored.as_ref(), TEST_DATA);
    }

    #[test]
    fn test_incompressible_data_falls_back() {
        let manager = CompressionManager::with_threshold(16);
        // xorshift noise does not compress
        let mut state: u32 = 0x9E37_79B9;
        let noise: Vec<u8> = (0..2000)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                state as u8
            })
            .collect();

        let (result, algorithm) = manager.compress(&noise);
        if algorithm == CompressionAlgorithm::None {
            assert_eq!(result.as_ref(), noise.as_slice());
        } else {
            assert!(result.len() < noise.len());
        }
    }

    #[test]
    fn test_garbage_fails_to_decompress() {
        let manager = CompressionManager::default();
        let result = manager.decompress(&[0x10, 0, 0, 0, 0xff, 0xff], CompressionAlgorithm::Lz4);
        assert!(result.is_err());

        let oversized = manager.decompress(&[0xff, 0xff, 0xff, 0x7f, 1, 2, 3], CompressionAlgorithm::Lz4);
        assert!(oversized.is_err());

        let truncated = manager.decompress(&[0x10], CompressionAlgorithm::Lz4);
        assert!(truncated.is_err());
    }

    #[test]
    fn test_tags_roundtrip() {
        for algorithm in [CompressionAlgorithm::None, CompressionAlgorithm::Lz4] {
            assert_eq!(CompressionAlgorithm::from_tag(algorithm.tag()), Some(algorithm));
        }
        assert_eq!(CompressionAlgorithm::from_tag(9), None);
    }
}
