//! File-backed durable store
//!
//! # Layout
//!
//! ```text
//! <root>/
//! ├── VERSION            layout version, decimal
//! └── records/
//!     ├── <sha256(key)>.rec
//!     └── ...
//! ```
//!
//! Each record is written to a uniquely named `.tmp` sibling and renamed into
//! place, so a crash mid-write leaves either the old record or the new one,
//! and concurrent writers to one key never share a temp file. Leftover
//! `.tmp` files are ignored by listing and removed by `clear()`.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::AsyncReadExt;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use super::compression::{CompressionConfig, PayloadCompressor};
use super::record::{self, RecordHeader, PREAMBLE_LEN};
use super::DurableStore;
use crate::cache::{CacheEntry, EntrySummary};
use crate::error::{StoreError, StoreResult};

/// Layout version written to `VERSION`
pub const LAYOUT_VERSION: u32 = 2;

const VERSION_FILE: &str = "VERSION";
const RECORDS_DIR: &str = "records";
const RECORD_EXT: &str = "rec";
const TMP_EXT: &str = "tmp";

/// Per-process sequence for temp file names
static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// File store configuration
#[derive(Debug, Clone)]
pub struct FileStoreConfig {
    /// Cache root directory
    pub root: PathBuf,
    /// Payload compression
    pub compression: CompressionConfig,
}

impl FileStoreConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            compression: CompressionConfig::default(),
        }
    }
}

/// Durable store keeping one record file per entry
pub struct FileStore {
    config: FileStoreConfig,
    compressor: PayloadCompressor,
    opened: OnceCell<()>,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_config(FileStoreConfig::new(root))
    }

    pub fn with_config(config: FileStoreConfig) -> Self {
        Self {
            compressor: PayloadCompressor::new(config.compression.clone()),
            config,
            opened: OnceCell::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.config.root
    }

    fn records_dir(&self) -> PathBuf {
        self.config.root.join(RECORDS_DIR)
    }

    fn version_path(&self) -> PathBuf {
        self.config.root.join(VERSION_FILE)
    }

    fn record_path(&self, key: &str) -> PathBuf {
        let digest = Sha256::digest(key.as_bytes());
        let name: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
        self.records_dir().join(format!("{}.{}", name, RECORD_EXT))
    }

    fn ensure_open(&self) -> StoreResult<()> {
        if self.opened.initialized() {
            Ok(())
        } else {
            Err(StoreError::NotOpen)
        }
    }

    async fn open_inner(&self) -> StoreResult<()> {
        let root = &self.config.root;
        if let Err(e) = fs::create_dir_all(root).await {
            return Err(match e.kind() {
                ErrorKind::PermissionDenied => StoreError::Unavailable(format!(
                    "cannot create cache directory {}: {}",
                    root.display(),
                    e
                )),
                _ => StoreError::Io(e),
            });
        }

        match self.read_version().await? {
            Some(found) if found == LAYOUT_VERSION => {}
            Some(found) if found > LAYOUT_VERSION => {
                return Err(StoreError::VersionConflict {
                    found,
                    expected: LAYOUT_VERSION,
                });
            }
            Some(found) => {
                info!(
                    "Migrating cache at {} from layout v{} to v{}",
                    root.display(),
                    found,
                    LAYOUT_VERSION
                );
                self.wipe_records().await?;
                self.write_version().await?;
            }
            None => {
                self.write_version().await?;
            }
        }

        fs::create_dir_all(self.records_dir()).await?;
        info!("Opened file cache store at {}", root.display());
        Ok(())
    }

    /// `None` when no version file exists yet; unreadable contents read as v0
    async fn read_version(&self) -> StoreResult<Option<u32>> {
        match fs::read_to_string(self.version_path()).await {
            Ok(contents) => match contents.trim().parse::<u32>() {
                Ok(version) => Ok(Some(version)),
                Err(_) => {
                    warn!("Unreadable {} file, treating cache as stale", VERSION_FILE);
                    Ok(Some(0))
                }
            },
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_version(&self) -> StoreResult<()> {
        write_atomic(&self.version_path(), LAYOUT_VERSION.to_string().as_bytes()).await
    }

    async fn wipe_records(&self) -> StoreResult<()> {
        match fs::remove_dir_all(self.records_dir()).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Paths of all committed record files
    async fn record_files(&self) -> StoreResult<Vec<PathBuf>> {
        let mut files = Vec::new();
        let mut dir = fs::read_dir(self.records_dir()).await?;
        while let Some(item) = dir.next_entry().await? {
            let path = item.path();
            if path.extension().and_then(|e| e.to_str()) == Some(RECORD_EXT) {
                files.push(path);
            }
        }
        Ok(files)
    }

    async fn read_record(&self, label: &str, path: &Path) -> StoreResult<Option<CacheEntry>> {
        let data = match fs::read(path).await {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        record::decode(label, Bytes::from(data), &self.compressor).map(Some)
    }

    async fn read_header(&self, label: &str, path: &Path) -> StoreResult<Option<RecordHeader>> {
        let mut file = match fs::File::open(path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut preamble = [0u8; PREAMBLE_LEN];
        if let Err(e) = file.read_exact(&mut preamble).await {
            return Err(match e.kind() {
                ErrorKind::UnexpectedEof => StoreError::Corrupt {
                    key: label.to_string(),
                    reason: "truncated preamble".into(),
                },
                _ => e.into(),
            });
        }
        let header_len = record::parse_preamble(label, &preamble)?;

        let mut header = vec![0u8; header_len];
        if let Err(e) = file.read_exact(&mut header).await {
            return Err(match e.kind() {
                ErrorKind::UnexpectedEof => StoreError::Corrupt {
                    key: label.to_string(),
                    reason: "truncated header".into(),
                },
                _ => e.into(),
            });
        }
        record::parse_header(label, &header).map(Some)
    }

    /// Corrupt records are dropped so they stop counting against capacity
    async fn discard_corrupt(&self, path: &Path, err: &StoreError) {
        warn!("Discarding corrupt cache record {}: {}", path.display(), err);
        if let Err(e) = fs::remove_file(path).await {
            if e.kind() != ErrorKind::NotFound {
                warn!("Failed to remove corrupt record {}: {}", path.display(), e);
            }
        }
    }
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// `<path>.<pid>-<seq>.tmp`, unique per write within the process
fn tmp_path(path: &Path) -> PathBuf {
    let seq = TMP_SEQ.fetch_add(1, Ordering::Relaxed);
    let mut name = path.as_os_str().to_owned();
    name.push(format!(".{}-{}.{}", std::process::id(), seq, TMP_EXT));
    PathBuf::from(name)
}

async fn write_atomic(path: &Path, data: &[u8]) -> StoreResult<()> {
    let tmp = tmp_path(path);
    fs::write(&tmp, data).await?;
    if let Err(e) = fs::rename(&tmp, path).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    Ok(())
}

#[async_trait]
impl DurableStore for FileStore {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn open(&self) -> StoreResult<()> {
        self.opened.get_or_try_init(|| self.open_inner()).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> StoreResult<Option<CacheEntry>> {
        self.ensure_open()?;
        let path = self.record_path(key);
        let entry = match self.read_record(key, &path).await {
            Ok(entry) => entry,
            Err(err @ StoreError::Corrupt { .. }) => {
                self.discard_corrupt(&path, &err).await;
                None
            }
            Err(e) => return Err(e),
        };
        // Guards against a SHA-256 collision or a hand-copied record
        Ok(entry.filter(|e| e.identity_key == key))
    }

    async fn put(&self, entry: CacheEntry) -> StoreResult<()> {
        self.ensure_open()?;
        let record = record::encode(&entry, &self.compressor)?;
        let path = self.record_path(&entry.identity_key);
        write_atomic(&path, &record).await?;
        debug!(
            "Wrote record for {} ({} bytes payload, {} on disk)",
            entry.identity_key,
            entry.size_bytes,
            record.len()
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.ensure_open()?;
        match fs::remove_file(self.record_path(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_all(&self) -> StoreResult<Vec<CacheEntry>> {
        self.ensure_open()?;
        let mut entries = Vec::new();
        for path in self.record_files().await? {
            match self.read_record(&file_label(&path), &path).await {
                Ok(Some(entry)) => entries.push(entry),
                Ok(None) => {}
                Err(err @ StoreError::Corrupt { .. }) => self.discard_corrupt(&path, &err).await,
                Err(e) => return Err(e),
            }
        }
        Ok(entries)
    }

    async fn list_summaries(&self) -> StoreResult<Vec<EntrySummary>> {
        self.ensure_open()?;
        let mut summaries = Vec::new();
        for path in self.record_files().await? {
            match self.read_header(&file_label(&path), &path).await {
                Ok(Some(header)) => summaries.push(header.summary()),
                Ok(None) => {}
                Err(err @ StoreError::Corrupt { .. }) => self.discard_corrupt(&path, &err).await,
                Err(e) => return Err(e),
            }
        }
        Ok(summaries)
    }

    async fn clear(&self) -> StoreResult<()> {
        self.ensure_open()?;
        self.wipe_records().await?;
        fs::create_dir_all(self.records_dir()).await?;
        info!("Cleared file cache store at {}", self.config.root.display());
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{BoundingBox, CacheEntryInput, MeshMetadata};
    use assert_matches::assert_matches;
    use chrono::{TimeZone, Utc};

    fn entry(key: &str, payload: &[u8], secs: i64) -> CacheEntry {
        CacheEntryInput::new(key, Bytes::copy_from_slice(payload), MeshMetadata::default())
            .into_entry(Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap(), "mesh-v1")
    }

    async fn open_store(root: &Path) -> FileStore {
        let store = FileStore::new(root);
        store.open().await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_operations_before_open_fail() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());

        assert_matches!(store.get("a").await, Err(StoreError::NotOpen));
        assert_matches!(store.put(entry("a", b"x", 0)).await, Err(StoreError::NotOpen));
        assert_matches!(store.list_all().await, Err(StoreError::NotOpen));
    }

    #[tokio::test]
    async fn test_open_creates_layout() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("cache");
        let _store = open_store(&root).await;

        assert!(root.join(RECORDS_DIR).is_dir());
        let version = std::fs::read_to_string(root.join(VERSION_FILE)).unwrap();
        assert_eq!(version, LAYOUT_VERSION.to_string());
    }

    #[tokio::test]
    async fn test_open_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());

        let (a, b) = tokio::join!(store.open(), store.open());
        a.unwrap();
        b.unwrap();
        store.open().await.unwrap();
    }

    #[tokio::test]
    async fn test_non_finite_bounding_box_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path()).await;

        let metadata = MeshMetadata {
            vertex_count: 0,
            bounding_box: BoundingBox::new(
                [f32::INFINITY, f32::INFINITY, f32::NAN],
                [f32::NEG_INFINITY, f32::NEG_INFINITY, f32::NAN],
            ),
            ..MeshMetadata::default()
        };
        let e = CacheEntryInput::new("empty.ydr", Bytes::from_static(b"mesh"), metadata)
            .into_entry(Utc.timestamp_opt(1_700_000_000, 0).unwrap(), "mesh-v1");
        store.put(e).await.unwrap();

        let got = store.get("empty.ydr").await.unwrap().expect("record kept");
        let bb = got.metadata.bounding_box;
        assert_eq!(bb.min[..2], [f32::INFINITY; 2]);
        assert_eq!(bb.max[..2], [f32::NEG_INFINITY; 2]);
        assert!(bb.min[2].is_nan() && bb.max[2].is_nan());

        assert_eq!(store.list_summaries().await.unwrap().len(), 1);
        assert_eq!(store.list_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_put_get_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path()).await;
        let original = entry("props/barrel.ydr", &[7u8; 4096], 0);

        store.put(original.clone()).await.unwrap();
        assert_eq!(store.get("props/barrel.ydr").await.unwrap(), Some(original));

        store.delete("props/barrel.ydr").await.unwrap();
        assert_eq!(store.get("props/barrel.ydr").await.unwrap(), None);

        // Deleting an absent key is fine
        store.delete("props/barrel.ydr").await.unwrap();
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path()).await;

        store.put(entry("a", b"old", 0)).await.unwrap();
        store.put(entry("a", b"newer", 5)).await.unwrap();

        let got = store.get("a").await.unwrap().unwrap();
        assert_eq!(got.payload.as_ref(), b"newer");
        assert_eq!(store.list_summaries().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = open_store(dir.path()).await;
            store.put(entry("a", b"persisted", 0)).await.unwrap();
        }

        let store = open_store(dir.path()).await;
        let got = store.get("a").await.unwrap().unwrap();
        assert_eq!(got.payload.as_ref(), b"persisted");
    }

    #[tokio::test]
    async fn test_list_all_and_summaries_agree() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path()).await;

        store.put(entry("a", &[1u8; 10], 0)).await.unwrap();
        store.put(entry("b", &[2u8; 3000], 1)).await.unwrap();

        let mut from_entries: Vec<EntrySummary> = store
            .list_all()
            .await
            .unwrap()
            .iter()
            .map(EntrySummary::from)
            .collect();
        let mut from_headers = store.list_summaries().await.unwrap();
        from_entries.sort_by(|a, b| a.identity_key.cmp(&b.identity_key));
        from_headers.sort_by(|a, b| a.identity_key.cmp(&b.identity_key));

        assert_eq!(from_entries, from_headers);
        assert_eq!(from_headers[1].size_bytes, 3000);
    }

    #[tokio::test]
    async fn test_corrupt_record_is_discarded_on_list() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path()).await;
        store.put(entry("good", b"fine", 0)).await.unwrap();

        let bad = dir.path().join(RECORDS_DIR).join("deadbeef.rec");
        std::fs::write(&bad, b"garbage").unwrap();

        let summaries = store.list_summaries().await.unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].identity_key, "good");
        assert!(!bad.exists());
    }

    #[tokio::test]
    async fn test_corrupt_record_on_get_is_miss() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path()).await;
        store.put(entry("a", &[5u8; 64], 0)).await.unwrap();

        let path = store.record_path("a");
        let mut data = std::fs::read(&path).unwrap();
        let last = data.len() - 1;
        data[last] ^= 0xff;
        std::fs::write(&path, data).unwrap();

        assert_eq!(store.get("a").await.unwrap(), None);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_older_layout_is_migrated() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(RECORDS_DIR)).unwrap();
        std::fs::write(dir.path().join(RECORDS_DIR).join("old.rec"), b"v0 data").unwrap();
        std::fs::write(dir.path().join(VERSION_FILE), "0").unwrap();

        let store = open_store(dir.path()).await;

        assert!(store.list_summaries().await.unwrap().is_empty());
        assert!(!dir.path().join(RECORDS_DIR).join("old.rec").exists());
        let version = std::fs::read_to_string(dir.path().join(VERSION_FILE)).unwrap();
        assert_eq!(version, LAYOUT_VERSION.to_string());
    }

    #[tokio::test]
    async fn test_newer_layout_is_conflict() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(VERSION_FILE), "99").unwrap();

        let store = FileStore::new(dir.path());
        assert_matches!(
            store.open().await,
            Err(StoreError::VersionConflict { found: 99, expected: LAYOUT_VERSION })
        );
        assert_matches!(store.get("a").await, Err(StoreError::NotOpen));
    }

    #[tokio::test]
    async fn test_root_is_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("not-a-dir");
        std::fs::write(&root, b"").unwrap();

        let store = FileStore::new(&root);
        assert!(store.open().await.is_err());
    }

    #[test]
    fn test_tmp_paths_are_unique() {
        let path = Path::new("/cache/records/abc.rec");
        let a = tmp_path(path);
        let b = tmp_path(path);

        assert_ne!(a, b);
        assert_eq!(a.extension().and_then(|e| e.to_str()), Some(TMP_EXT));
        assert!(a.to_string_lossy().starts_with("/cache/records/abc.rec."));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_puts_to_one_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = std::sync::Arc::new(open_store(dir.path()).await);

        let handles: Vec<_> = (0..16u8)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    let payload = vec![i; 4096 + i as usize];
                    store.put(entry("shared", &payload, i as i64)).await
                })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        // Whichever write landed last, it is a whole record
        let got = store.get("shared").await.unwrap().unwrap();
        let fill = got.payload[0];
        assert_eq!(got.payload.len(), 4096 + fill as usize);
        assert!(got.payload.iter().all(|b| *b == fill));

        let leftovers = std::fs::read_dir(dir.path().join(RECORDS_DIR))
            .unwrap()
            .filter(|e| {
                e.as_ref().unwrap().path().extension().and_then(|x| x.to_str()) == Some(TMP_EXT)
            })
            .count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn test_clear_removes_records_and_tmp_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path()).await;
        store.put(entry("a", b"1", 0)).await.unwrap();
        store.put(entry("b", b"2", 1)).await.unwrap();
        std::fs::write(dir.path().join(RECORDS_DIR).join("x.rec.tmp"), b"partial").unwrap();

        store.clear().await.unwrap();
        assert!(store.list_all().await.unwrap().is_empty());
        assert_eq!(
            std::fs::read_dir(dir.path().join(RECORDS_DIR)).unwrap().count(),
            0
        );

        // Clearing an empty store is a no-op
        store.clear().await.unwrap();
    }
}
