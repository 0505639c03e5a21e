//! On-disk record encoding
//!
//! ```text
//! ┌────────┬──────────────┬──────────────────┬─────────────────────┐
//! │ "ACR1" │ header_len   │ JSON header      │ stored payload      │
//! │ 4 B    │ u32 LE       │ header_len bytes │ header.stored_len B │
//! └────────┴──────────────┴──────────────────┴─────────────────────┘
//! ```
//!
//! The header carries every entry field except the payload, plus the payload
//! encoding and a checksum over the stored (possibly compressed) bytes. Stats
//! and eviction only need the header, so the preamble and header can be read
//! without touching the payload.

use bytes::{BufMut, Bytes, BytesMut};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::compression::{CompressionAlgorithm, PayloadCompressor};
use crate::cache::{CacheEntry, EntrySummary, IdentityHasher, MeshMetadata};
use crate::error::{StoreError, StoreResult};

pub const MAGIC: &[u8; 4] = b"ACR1";
pub const PREAMBLE_LEN: usize = 8;
const MAX_HEADER_LEN: u32 = 1024 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordHeader {
    pub identity_key: String,
    pub content_hash: String,
    pub metadata: MeshMetadata,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
    pub schema_version: String,
    pub compression: CompressionAlgorithm,
    pub stored_len: u64,
    pub checksum: u64,
}

impl RecordHeader {
    pub fn summary(&self) -> EntrySummary {
        EntrySummary {
            identity_key: self.identity_key.clone(),
            size_bytes: self.size_bytes,
            created_at: self.created_at,
        }
    }
}

fn corrupt(key: &str, reason: impl Into<String>) -> StoreError {
    StoreError::Corrupt {
        key: key.to_string(),
        reason: reason.into(),
    }
}

/// Serialize an entry into a record
pub fn encode(entry: &CacheEntry, compressor: &PayloadCompressor) -> StoreResult<Bytes> {
    let (stored, compression) = compressor.encode(&entry.payload);
    let header = RecordHeader {
        identity_key: entry.identity_key.clone(),
        content_hash: entry.content_hash.clone(),
        metadata: entry.metadata.clone(),
        size_bytes: entry.size_bytes,
        created_at: entry.created_at,
        schema_version: entry.schema_version.clone(),
        compression,
        stored_len: stored.len() as u64,
        checksum: IdentityHasher::checksum(&stored),
    };
    let header_json = serde_json::to_vec(&header)?;

    let mut buf = BytesMut::with_capacity(PREAMBLE_LEN + header_json.len() + stored.len());
    buf.put_slice(MAGIC);
    buf.put_u32_le(header_json.len() as u32);
    buf.put_slice(&header_json);
    buf.put_slice(&stored);
    Ok(buf.freeze())
}

/// Validate the preamble and return the header length
///
/// `label` names the record in errors (key or file name).
pub fn parse_preamble(label: &str, preamble: &[u8]) -> StoreResult<usize> {
    if preamble.len() < PREAMBLE_LEN {
        return Err(corrupt(label, "truncated preamble"));
    }
    if &preamble[..4] != MAGIC {
        return Err(corrupt(label, "bad magic"));
    }
    let header_len = u32::from_le_bytes([preamble[4], preamble[5], preamble[6], preamble[7]]);
    if header_len == 0 || header_len > MAX_HEADER_LEN {
        return Err(corrupt(label, format!("implausible header length {}", header_len)));
    }
    Ok(header_len as usize)
}

pub fn parse_header(label: &str, bytes: &[u8]) -> StoreResult<RecordHeader> {
    serde_json::from_slice(bytes).map_err(|e| corrupt(label, format!("bad header: {}", e)))
}

/// Decode a full record
pub fn decode(label: &str, record: Bytes, compressor: &PayloadCompressor) -> StoreResult<CacheEntry> {
    let header_len = parse_preamble(label, &record)?;
    let header_end = PREAMBLE_LEN + header_len;
    if record.len() < header_end {
        return Err(corrupt(label, "truncated header"));
    }
    let header = parse_header(label, &record[PREAMBLE_LEN..header_end])?;

    let stored = record.slice(header_end..);
    if stored.len() as u64 != header.stored_len {
        return Err(corrupt(
            &header.identity_key,
            format!("payload is {} bytes, header says {}", stored.len(), header.stored_len),
        ));
    }
    if IdentityHasher::checksum(&stored) != header.checksum {
        return Err(corrupt(&header.identity_key, "checksum mismatch"));
    }

    let payload = compressor
        .decode(stored, header.compression, header.size_bytes)
        .map_err(|e| corrupt(&header.identity_key, e.to_string()))?;

    Ok(CacheEntry {
        identity_key: header.identity_key,
        content_hash: header.content_hash,
        payload,
        metadata: header.metadata,
        size_bytes: header.size_bytes,
        created_at: header.created_at,
        schema_version: header.schema_version,
    })
}
