//! Content Identity Hashing
//!
//! Derives the content hash used to validate a cache hit. The hash covers the
//! asset's actual bytes (or a length + modification time fingerprint), seeded
//! with the identity key, so a changed asset under an unchanged name misses.
//!
//! The digest is FxHash over 64-bit words: fast and deterministic across
//! processes, not collision resistant. This is not a security boundary.

use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

const SEED: u64 = 0x517cc1b727220a95;

/// What to hash for an asset
#[derive(Debug, Clone, Copy)]
pub enum ContentSource<'a> {
    /// The asset's bytes
    Bytes(&'a [u8]),
    /// Cheap proxy: byte length and modification time
    Fingerprint {
        len: u64,
        modified: Option<SystemTime>,
    },
}

impl ContentSource<'_> {
    fn tag(&self) -> char {
        match self {
            ContentSource::Bytes(_) => 'b',
            ContentSource::Fingerprint { .. } => 'f',
        }
    }

    fn len(&self) -> u64 {
        match self {
            ContentSource::Bytes(bytes) => bytes.len() as u64,
            ContentSource::Fingerprint { len, .. } => *len,
        }
    }
}

/// Content hash derivation
pub struct IdentityHasher;

impl IdentityHasher {
    /// Hash an asset's content, seeded with its identity key
    ///
    /// Output looks like `b:1f4:8c1e0d2a9b3f6e71`: source tag, length in hex,
    /// 64-bit digest.
    pub fn hash(identity_key: &str, source: ContentSource<'_>) -> String {
        let mut state = FxState::new();
        state.write(identity_key.as_bytes());
        state.write_u8(0xff);

        match source {
            ContentSource::Bytes(bytes) => state.write(bytes),
            ContentSource::Fingerprint { len, modified } => {
                state.write_u64(len);
                let (secs, nanos) = modified
                    .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                    .map(|d| (d.as_secs(), d.subsec_nanos()))
                    .unwrap_or((0, 0));
                state.write_u64(secs);
                state.write_u64(nanos as u64);
            }
        }

        format!("{}:{:x}:{:016x}", source.tag(), source.len(), state.finish())
    }

    /// Fingerprint of a file on disk from its metadata, without reading it
    ///
    /// Pass the result to [`IdentityHasher::hash`].
    pub async fn fingerprint_file(path: impl AsRef<Path>) -> std::io::Result<ContentSource<'static>> {
        let meta = tokio::fs::metadata(path).await?;
        Ok(ContentSource::Fingerprint {
            len: meta.len(),
            modified: meta.modified().ok(),
        })
    }

    /// Unseeded checksum of raw bytes, used for record integrity
    #[inline]
    pub fn checksum(bytes: &[u8]) -> u64 {
        let mut state = FxState::new();
        state.write(bytes);
        state.finish()
    }
}

/// FxHash accumulator
struct FxState {
    hash: u64,
}

impl FxState {
    fn new() -> Self {
        Self { hash: SEED }
    }

    #[inline]
    fn add(&mut self, word: u64) {
        self.hash = (self.hash.rotate_left(5) ^ word).wrapping_mul(SEED);
    }

    fn write(&mut self, bytes: &[u8]) {
        let mut chunks = bytes.chunks_exact(8);
        for chunk in &mut chunks {
            let mut word = [0u8; 8];
            word.copy_from_slice(chunk);
            self.add(u64::from_le_bytes(word));
        }
        for &byte in chunks.remainder() {
            self.add(byte as u64);
        }
    }

    fn write_u8(&mut self, value: u8) {
        self.add(value as u64);
    }

    fn write_u64(&mut self, value: u64) {
        self.add(value);
    }

    fn finish(&self) -> u64 {
        self.hash
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_hash_is_deterministic() {
        let a = IdentityHasher::hash("prop.ydr", ContentSource::Bytes(b"vertex data"));
        let b = IdentityHasher::hash("prop.ydr", ContentSource::Bytes(b"vertex data"));
        assert_eq!(a, b);
    }

    #[test]
    fn test_changed_content_same_name_differs() {
        let a = IdentityHasher::hash("prop.ydr", ContentSource::Bytes(b"version one"));
        let b = IdentityHasher::hash("prop.ydr", ContentSource::Bytes(b"version two"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_same_content_different_name_differs() {
        let a = IdentityHasher::hash("a.ydr", ContentSource::Bytes(b"same"));
        let b = IdentityHasher::hash("b.ydr", ContentSource::Bytes(b"same"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_format_includes_tag_and_length() {
        let h = IdentityHasher::hash("k", ContentSource::Bytes(&[0u8; 500]));
        assert!(h.starts_with("b:1f4:"), "unexpected hash format: {}", h);
        assert_eq!(h.len(), "b:1f4:".len() + 16);
    }

    #[test]
    fn test_fingerprint_tracks_mtime() {
        let t0 = UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        let t1 = t0 + Duration::from_secs(1);

        let a = IdentityHasher::hash("k", ContentSource::Fingerprint { len: 10, modified: Some(t0) });
        let b = IdentityHasher::hash("k", ContentSource::Fingerprint { len: 10, modified: Some(t1) });
        let c = IdentityHasher::hash("k", ContentSource::Fingerprint { len: 10, modified: Some(t0) });

        assert_ne!(a, b);
        assert_eq!(a, c);
        assert!(a.starts_with("f:a:"));
    }

    #[test]
    fn test_fingerprint_never_equals_byte_hash() {
        let bytes = IdentityHasher::hash("k", ContentSource::Bytes(&[]));
        let fp = IdentityHasher::hash("k", ContentSource::Fingerprint { len: 0, modified: None });
        assert_ne!(bytes, fp);
    }

    #[test]
    fn test_checksum_unaligned_tail() {
        // 9 bytes: one full word plus a one-byte remainder
        assert_ne!(
            IdentityHasher::checksum(b"123456789"),
            IdentityHasher::checksum(b"123456788")
        );
        assert_eq!(IdentityHasher::checksum(b""), SEED);
    }

    #[tokio::test]
    async fn test_file_fingerprint() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("asset.ydr");
        tokio::fs::write(&path, b"model bytes").await.unwrap();

        let source = IdentityHasher::fingerprint_file(&path).await.unwrap();
        assert!(matches!(source, ContentSource::Fingerprint { len: 11, modified: Some(_) }));

        let h = IdentityHasher::hash("asset.ydr", source);
        assert!(h.starts_with("f:b:"));
        assert_eq!(h, IdentityHasher::hash("asset.ydr", source));
        assert_ne!(h, IdentityHasher::hash("asset.ydr", ContentSource::Bytes(b"model bytes")));

        let missing = IdentityHasher::fingerprint_file(dir.path().join("nope")).await;
        assert!(missing.is_err());
    }
}
