//! In-memory durable store
//!
//! Nothing survives the process. Used by tests and by hosts that only want
//! the cache's accounting without persistence.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;

use super::DurableStore;
use crate::cache::{CacheEntry, EntrySummary};
use crate::error::{StoreError, StoreResult};

/// Operation counters for an [`InMemoryStore`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InMemoryStoreStats {
    pub open_calls: u64,
    pub physical_opens: u64,
    pub reads: u64,
    pub writes: u64,
    pub deletes: u64,
}

/// `DashMap`-backed store keyed by identity key
#[derive(Default)]
pub struct InMemoryStore {
    entries: DashMap<String, CacheEntry>,
    quota_bytes: Option<u64>,
    opened: AtomicBool,
    open_calls: AtomicU64,
    physical_opens: AtomicU64,
    reads: AtomicU64,
    writes: AtomicU64,
    deletes: AtomicU64,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that rejects writes once `quota_bytes` of payload is held
    pub fn with_quota(quota_bytes: u64) -> Self {
        Self {
            quota_bytes: Some(quota_bytes),
            ..Self::default()
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_bytes(&self) -> u64 {
        self.entries.iter().map(|e| e.value().size_bytes).sum()
    }

    pub fn stats(&self) -> InMemoryStoreStats {
        InMemoryStoreStats {
            open_calls: self.open_calls.load(Ordering::Relaxed),
            physical_opens: self.physical_opens.load(Ordering::Relaxed),
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
        }
    }

    fn ensure_open(&self) -> StoreResult<()> {
        if self.opened.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(StoreError::NotOpen)
        }
    }
}

#[async_trait]
impl DurableStore for InMemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn open(&self) -> StoreResult<()> {
        self.open_calls.fetch_add(1, Ordering::Relaxed);
        if self
            .opened
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.physical_opens.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> StoreResult<Option<CacheEntry>> {
        self.ensure_open()?;
        self.reads.fetch_add(1, Ordering::Relaxed);
        Ok(self.entries.get(key).map(|e| e.value().clone()))
    }

    async fn put(&self, entry: CacheEntry) -> StoreResult<()> {
        self.ensure_open()?;
        if let Some(quota) = self.quota_bytes {
            let replaced = self
                .entries
                .get(&entry.identity_key)
                .map(|e| e.value().size_bytes)
                .unwrap_or(0);
            let requested = self.total_bytes() - replaced + entry.size_bytes;
            if requested > quota {
                return Err(StoreError::QuotaExceeded { requested, quota });
            }
        }

        self.writes.fetch_add(1, Ordering::Relaxed);
        self.entries.insert(entry.identity_key.clone(), entry);
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.ensure_open()?;
        self.deletes.fetch_add(1, Ordering::Relaxed);
        self.entries.remove(key);
        Ok(())
    }

    async fn list_all(&self) -> StoreResult<Vec<CacheEntry>> {
        self.ensure_open()?;
        Ok(self.entries.iter().map(|e| e.value().clone()).collect())
    }

    async fn list_summaries(&self) -> StoreResult<Vec<EntrySummary>> {
        self.ensure_open()?;
        Ok(self
            .entries
            .iter()
            .map(|e| EntrySummary::from(e.value()))
            .collect())
    }

    async fn clear(&self) -> StoreResult<()> {
        self.ensure_open()?;
        self.entries.clear();
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
