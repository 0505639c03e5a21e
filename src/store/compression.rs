//! Record Payload Compression
//!
//! Decoded mesh buffers are float-heavy and repetitive, so the file store
//! LZ4-compresses them before writing. Small or incompressible payloads are
//! stored raw; the algorithm actually used is recorded in each record header.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

// =============================================================================
// Compression Algorithm
// =============================================================================

/// Payload encodings understood by the record format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionAlgorithm {
    /// Stored as-is
    None,
    /// LZ4 block format with a length prefix
    #[default]
    Lz4,
}

impl CompressionAlgorithm {
    pub fn name(&self) -> &'static str {
        match self {
            CompressionAlgorithm::None => "none",
            CompressionAlgorithm::Lz4 => "lz4",
        }
    }
}

impl std::fmt::Display for CompressionAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

// =============================================================================
// Compression Configuration
// =============================================================================

/// Configuration for payload compression
#[derive(Debug, Clone)]
pub struct CompressionConfig {
    /// Algorithm to try for payloads above the threshold
    pub algorithm: CompressionAlgorithm,
    /// Payloads smaller than this are stored uncompressed
    pub min_size_bytes: u64,
    /// LZ4 high-compression level
    pub level: i32,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            algorithm: CompressionAlgorithm::Lz4,
            min_size_bytes: 1024,
            level: 4,
        }
    }
}

impl CompressionConfig {
    /// Store every payload raw
    pub fn disabled() -> Self {
        Self {
            algorithm: CompressionAlgorithm::None,
            ..Self::default()
        }
    }
}

// =============================================================================
// Compressors
// =============================================================================

pub trait Compressor: Send + Sync {
    fn algorithm(&self) -> CompressionAlgorithm;

    fn compress(&self, data: &[u8]) -> StoreResult<Vec<u8>>;

    fn decompress(&self, data: &[u8]) -> StoreResult<Vec<u8>>;
}

/// Pass-through compressor
pub struct NoopCompressor;

impl Compressor for NoopCompressor {
    fn algorithm(&self) -> CompressionAlgorithm {
        CompressionAlgorithm::None
    }

    fn compress(&self, data: &[u8]) -> StoreResult<Vec<u8>> {
        Ok(data.to_vec())
    }

    fn decompress(&self, data: &[u8]) -> StoreResult<Vec<u8>> {
        Ok(data.to_vec())
    }
}

pub struct Lz4Compressor {
    level: i32,
}

impl Lz4Compressor {
    pub fn with_level(level: i32) -> Self {
        Self { level }
    }
}

impl Compressor for Lz4Compressor {
    fn algorithm(&self) -> CompressionAlgorithm {
        CompressionAlgorithm::Lz4
    }

    fn compress(&self, data: &[u8]) -> StoreResult<Vec<u8>> {
        lz4::block::compress(
            data,
            Some(lz4::block::CompressionMode::HIGHCOMPRESSION(self.level)),
            true,
        )
        .map_err(|e| StoreError::CompressionFailed {
            algorithm: "LZ4".into(),
            reason: e.to_string(),
        })
    }

    fn decompress(&self, data: &[u8]) -> StoreResult<Vec<u8>> {
        lz4::block::decompress(data, None).map_err(|e| StoreError::DecompressionFailed {
            algorithm: "LZ4".into(),
            reason: e.to_string(),
        })
    }
}

// =============================================================================
// Payload Compressor
// =============================================================================

/// Chooses and applies the payload encoding for records
pub struct PayloadCompressor {
    config: CompressionConfig,
    noop: NoopCompressor,
    lz4: Lz4Compressor,
}

impl PayloadCompressor {
    pub fn new(config: CompressionConfig) -> Self {
        Self {
            lz4: Lz4Compressor::with_level(config.level),
            noop: NoopCompressor,
            config,
        }
    }

    fn compressor(&self, algorithm: CompressionAlgorithm) -> &dyn Compressor {
        match algorithm {
            CompressionAlgorithm::None => &self.noop,
            CompressionAlgorithm::Lz4 => &self.lz4,
        }
    }

    /// Encode a payload for storage
    ///
    /// Never fails: a compression error or a result that is not smaller than
    /// the input falls back to storing the payload raw.
    pub fn encode(&self, payload: &Bytes) -> (Bytes, CompressionAlgorithm) {
        let algorithm = self.config.algorithm;
        if algorithm == CompressionAlgorithm::None
            || (payload.len() as u64) < self.config.min_size_bytes
        {
            return (payload.clone(), CompressionAlgorithm::None);
        }

        match self.compressor(algorithm).compress(payload) {
            Ok(compressed) if compressed.len() < payload.len() => {
                (Bytes::from(compressed), algorithm)
            }
            Ok(_) => (payload.clone(), CompressionAlgorithm::None),
            Err(e) => {
                tracing::warn!("Compression failed, storing payload raw: {}", e);
                (payload.clone(), CompressionAlgorithm::None)
            }
        }
    }

    /// Decode a stored payload, checking it expands to `expected_len` bytes
    pub fn decode(
        &self,
        stored: Bytes,
        algorithm: CompressionAlgorithm,
        expected_len: u64,
    ) -> StoreResult<Bytes> {
        let payload = match algorithm {
            CompressionAlgorithm::None => stored,
            CompressionAlgorithm::Lz4 => {
                // The size prefix drives allocation; reject it before trusting it
                let prefix = stored
                    .get(..4)
                    .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]) as u64);
                if prefix != Some(expected_len) {
                    return Err(StoreError::DecompressionFailed {
                        algorithm: algorithm.name().into(),
                        reason: format!("size prefix {:?} != {}", prefix, expected_len),
                    });
                }
                Bytes::from(self.lz4.decompress(&stored)?)
            }
        };

        if payload.len() as u64 != expected_len {
            return Err(StoreError::DecompressionFailed {
                algorithm: algorithm.name().into(),
                reason: format!(
                    "expected {} bytes, decoded {}",
                    expected_len,
                    payload.len()
                ),
            });
        }
        Ok(payload)
    }
}

impl Default for PayloadCompressor {
    fn default() -> Self {
        Self::new(CompressionConfig::default())
    }
}
