//! Error types for the asset cache

use thiserror::Error;

/// Result type alias for durable store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Result type alias for cache facade operations
pub type Result<T> = std::result::Result<T, CacheError>;

/// Errors raised by a [`DurableStore`](crate::store::DurableStore) backend
#[derive(Error, Debug)]
pub enum StoreError {
    /// Operation attempted before `open()` succeeded
    #[error("store is not open")]
    NotOpen,

    /// The backing storage cannot be used in this environment
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// On-disk layout is newer than this build understands
    #[error("store layout version {found} is not supported (expected {expected})")]
    VersionConflict { found: u32, expected: u32 },

    /// Write would exceed the backend's byte quota
    #[error("quota exceeded: {requested} bytes requested, quota is {quota} bytes")]
    QuotaExceeded { requested: u64, quota: u64 },

    /// A persisted record failed validation
    #[error("corrupt record for '{key}': {reason}")]
    Corrupt { key: String, reason: String },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Record header (de)serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Compression failed
    #[error("Compression with {algorithm} failed: {reason}")]
    CompressionFailed { algorithm: String, reason: String },

    /// Decompression failed
    #[error("Decompression with {algorithm} failed: {reason}")]
    DecompressionFailed { algorithm: String, reason: String },
}

/// Errors surfaced by [`AssetCache`](crate::cache::AssetCache)
///
/// Cache-semantic non-hits (expired, hash mismatch) are never errors; they
/// come back as `Ok(None)` from `get`.
#[derive(Error, Debug)]
pub enum CacheError {
    /// The durable store does not exist in this environment; cache disabled
    #[error("cache store unavailable: {0}")]
    StoreUnavailable(String),

    /// The store exists but could not be opened or migrated; cache disabled
    #[error("failed to open cache store: {0}")]
    OpenFailure(String),

    /// Transient read failure
    #[error("cache read failed: {0}")]
    ReadFailure(#[source] StoreError),

    /// Transient write failure (including quota exceeded)
    #[error("cache write failed: {0}")]
    WriteFailure(#[source] StoreError),

    /// Entry can never fit within the configured capacity
    #[error("entry '{key}' is {size} bytes, larger than cache capacity of {capacity} bytes")]
    EntryTooLarge { key: String, size: u64, capacity: u64 },

    /// Configuration rejected by validation
    #[error("invalid cache configuration: {0}")]
    InvalidConfig(String),
}

impl CacheError {
    /// Returns true if this error permanently disables the cache
    pub fn is_fatal(&self) -> bool {
        matches!(self, CacheError::StoreUnavailable(_) | CacheError::OpenFailure(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(CacheError::StoreUnavailable("no dir".into()).is_fatal());
        assert!(CacheError::OpenFailure("version".into()).is_fatal());
        assert!(!CacheError::ReadFailure(StoreError::NotOpen).is_fatal());
        assert!(!CacheError::WriteFailure(StoreError::QuotaExceeded {
            requested: 10,
            quota: 5
        })
        .is_fatal());
    }

    #[test]
    fn test_error_messages() {
        let err = StoreError::VersionConflict {
            found: 3,
            expected: 1,
        };
        assert_eq!(
            err.to_string(),
            "store layout version 3 is not supported (expected 1)"
        );

        let err = CacheError::EntryTooLarge {
            key: "big.ydr".into(),
            size: 10,
            capacity: 5,
        };
        assert!(err.to_string().contains("big.ydr"));
    }
}
