//! Cache Entry Types
//!
//! The unit of storage is a [`CacheEntry`]: one decoded model payload plus the
//! facts the decoder discovered about it. Callers hand the cache a
//! [`CacheEntryInput`]; the cache stamps size, insertion time and schema tag.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::hasher::{ContentSource, IdentityHasher};

/// Axis-aligned bounding box of a decoded mesh
///
/// Corners serialize as IEEE-754 bit patterns so infinities and NaN survive
/// JSON. Decoders commonly seed an empty box with `+inf`/`-inf`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    #[serde(with = "f32_bits")]
    pub min: [f32; 3],
    #[serde(with = "f32_bits")]
    pub max: [f32; 3],
}

/// `[f32; 3]` as `[u32; 3]` of raw bits
mod f32_bits {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(value: &[f32; 3], serializer: S) -> Result<S::Ok, S::Error> {
        value.map(f32::to_bits).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[f32; 3], D::Error> {
        let bits = <[u32; 3]>::deserialize(deserializer)?;
        Ok(bits.map(f32::from_bits))
    }
}

impl BoundingBox {
    pub fn new(min: [f32; 3], max: [f32; 3]) -> Self {
        Self { min, max }
    }
}

/// Decode-time facts about a cached mesh
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeshMetadata {
    pub vertex_count: u32,
    pub face_count: u32,
    pub has_normals: bool,
    pub has_uvs: bool,
    pub bounding_box: BoundingBox,
}

/// A cached asset as persisted by the durable store
#[derive(Clone, PartialEq)]
pub struct CacheEntry {
    /// Logical asset name; primary key
    pub identity_key: String,
    /// Digest of the asset's content
    pub content_hash: String,
    /// Opaque decoded buffer
    pub payload: Bytes,
    /// Decode-time facts
    pub metadata: MeshMetadata,
    /// `payload.len()` at write time
    pub size_bytes: u64,
    /// Insertion time
    pub created_at: DateTime<Utc>,
    /// Payload format tag
    pub schema_version: String,
}

impl CacheEntry {
    /// Age of the entry relative to `now`; negative ages clamp to zero
    pub fn age(&self, now: DateTime<Utc>) -> std::time::Duration {
        age_at(self.created_at, now)
    }

    /// True once the entry is strictly older than `window`
    #[inline]
    pub fn is_expired(&self, now: DateTime<Utc>, window: std::time::Duration) -> bool {
        self.age(now) > window
    }

    /// True if the size field still agrees with the payload
    #[inline]
    pub fn size_matches_payload(&self) -> bool {
        self.size_bytes == self.payload.len() as u64
    }

    /// Payload-free projection used for accounting
    pub fn summary(&self) -> EntrySummary {
        EntrySummary::from(self)
    }
}

impl std::fmt::Debug for CacheEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheEntry")
            .field("identity_key", &self.identity_key)
            .field("content_hash", &self.content_hash)
            .field("size_bytes", &self.size_bytes)
            .field("created_at", &self.created_at)
            .field("schema_version", &self.schema_version)
            .finish()
    }
}

/// What a caller supplies to `set()`
///
/// `created_at`, `size_bytes` and `schema_version` are filled in by the cache.
#[derive(Clone)]
pub struct CacheEntryInput {
    pub identity_key: String,
    pub content_hash: String,
    pub payload: Bytes,
    pub metadata: MeshMetadata,
}

impl CacheEntryInput {
    /// Create an input whose content hash is derived from the payload bytes
    pub fn new(identity_key: impl Into<String>, payload: Bytes, metadata: MeshMetadata) -> Self {
        let identity_key = identity_key.into();
        let content_hash = IdentityHasher::hash(&identity_key, ContentSource::Bytes(&payload));
        Self {
            identity_key,
            content_hash,
            payload,
            metadata,
        }
    }

    /// Override the content hash, e.g. with a hash of the undecoded source file
    pub fn with_content_hash(mut self, content_hash: impl Into<String>) -> Self {
        self.content_hash = content_hash.into();
        self
    }

    /// Payload size in bytes
    #[inline]
    pub fn size(&self) -> u64 {
        self.payload.len() as u64
    }

    /// Stamp the input into a storable entry
    pub fn into_entry(self, created_at: DateTime<Utc>, schema_version: &str) -> CacheEntry {
        CacheEntry {
            size_bytes: self.payload.len() as u64,
            identity_key: self.identity_key,
            content_hash: self.content_hash,
            payload: self.payload,
            metadata: self.metadata,
            created_at,
            schema_version: schema_version.to_string(),
        }
    }
}

impl std::fmt::Debug for CacheEntryInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheEntryInput")
            .field("identity_key", &self.identity_key)
            .field("content_hash", &self.content_hash)
            .field("size", &self.payload.len())
            .finish()
    }
}

/// Accounting view of an entry: everything eviction and stats need
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntrySummary {
    pub identity_key: String,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
}

impl EntrySummary {
    #[inline]
    pub fn is_expired(&self, now: DateTime<Utc>, window: std::time::Duration) -> bool {
        age_at(self.created_at, now) > window
    }
}

impl From<&CacheEntry> for EntrySummary {
    fn from(entry: &CacheEntry) -> Self {
        Self {
            identity_key: entry.identity_key.clone(),
            size_bytes: entry.size_bytes,
            created_at: entry.created_at,
        }
    }
}

fn age_at(created_at: DateTime<Utc>, now: DateTime<Utc>) -> std::time::Duration {
    (now - created_at).to_std().unwrap_or_default()
}

// =============================================================================
// Tests
// =============================================================================
