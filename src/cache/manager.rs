//! Asset Cache Manager
//!
//! Public surface of the cache. Orchestrates the durable store, eviction
//! policy and stats aggregation, with lazy single-flight initialization and
//! failure containment:
//!
//! ```text
//! Uninitialized ──▶ Initializing ──▶ Ready
//!                        │
//!                        └─────────▶ Unavailable (terminal)
//! ```
//!
//! Once `Unavailable`, every operation degrades to a miss or a no-op for the
//! lifetime of the instance. There is no retry.
//!
//! `set()` is a read-decide-evict-write sequence and is not atomic. Two
//! concurrent inserts can both plan against the same snapshot and leave the
//! total above capacity by up to one entry until the next insert.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use super::clock::{Clock, SystemClock};
use super::entry::{CacheEntry, CacheEntryInput};
use super::metrics::{CacheMetrics, LatencyTracker, MetricsSnapshot};
use super::policy::EvictionPolicy;
use super::stats::CacheStats;
use super::{
    DEFAULT_CAPACITY_BYTES, DEFAULT_HEADROOM, DEFAULT_SCHEMA_VERSION, DEFAULT_STALENESS_WINDOW,
};
use crate::error::{CacheError, Result, StoreError};
use crate::store::DurableStore;

/// Cache configuration
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Hard budget for the sum of payload sizes
    pub capacity_bytes: u64,
    /// Fraction of capacity eviction drives the total down to
    pub headroom: f64,
    /// Entries older than this read as absent
    pub staleness_window: Duration,
    /// Payload format tag stamped on writes and required on reads
    pub schema_version: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity_bytes: DEFAULT_CAPACITY_BYTES,
            headroom: DEFAULT_HEADROOM,
            staleness_window: DEFAULT_STALENESS_WINDOW,
            schema_version: DEFAULT_SCHEMA_VERSION.to_string(),
        }
    }
}

impl CacheConfig {
    pub fn validate(&self) -> Result<()> {
        if self.capacity_bytes == 0 {
            return Err(CacheError::InvalidConfig("capacity must be non-zero".into()));
        }
        if !(self.headroom > 0.0 && self.headroom <= 1.0) {
            return Err(CacheError::InvalidConfig(format!(
                "headroom must be in (0, 1], got {}",
                self.headroom
            )));
        }
        if self.staleness_window.is_zero() {
            return Err(CacheError::InvalidConfig(
                "staleness window must be non-zero".into(),
            ));
        }
        if self.schema_version.trim().is_empty() {
            return Err(CacheError::InvalidConfig(
                "schema version must not be empty".into(),
            ));
        }
        Ok(())
    }

    pub fn eviction_policy(&self) -> EvictionPolicy {
        EvictionPolicy::new(self.capacity_bytes, self.headroom)
    }
}

/// Lifecycle state of an [`AssetCache`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    Uninitialized,
    Initializing,
    Ready,
    Unavailable,
}

impl std::fmt::Display for CacheState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheState::Uninitialized => write!(f, "uninitialized"),
            CacheState::Initializing => write!(f, "initializing"),
            CacheState::Ready => write!(f, "ready"),
            CacheState::Unavailable => write!(f, "unavailable"),
        }
    }
}

/// Why initialization failed; replayed to every later `init()` caller
#[derive(Debug, Clone)]
struct InitFailure {
    store_missing: bool,
    reason: String,
}

impl InitFailure {
    fn from_store(err: &StoreError) -> Self {
        Self {
            store_missing: matches!(err, StoreError::Unavailable(_)),
            reason: err.to_string(),
        }
    }

    fn to_error(&self) -> CacheError {
        if self.store_missing {
            CacheError::StoreUnavailable(self.reason.clone())
        } else {
            CacheError::OpenFailure(self.reason.clone())
        }
    }
}

/// Capacity-bounded cache of decoded assets over a [`DurableStore`]
pub struct AssetCache {
    store: Arc<dyn DurableStore>,
    config: CacheConfig,
    policy: EvictionPolicy,
    clock: Arc<dyn Clock>,
    init: OnceCell<std::result::Result<(), InitFailure>>,
    state: RwLock<CacheState>,
    metrics: CacheMetrics,
}

impl AssetCache {
    /// Create a cache with default configuration
    pub fn new(store: Arc<dyn DurableStore>) -> Self {
        let config = CacheConfig::default();
        Self {
            store,
            policy: config.eviction_policy(),
            config,
            clock: Arc::new(SystemClock),
            init: OnceCell::new(),
            state: RwLock::new(CacheState::Uninitialized),
            metrics: CacheMetrics::new(),
        }
    }

    /// Create a cache with custom configuration
    pub fn with_config(store: Arc<dyn DurableStore>, config: CacheConfig) -> Result<Self> {
        config.validate()?;
        let mut cache = Self::new(store);
        cache.policy = config.eviction_policy();
        cache.config = config;
        Ok(cache)
    }

    /// Replace the time source
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Open the store once; later calls replay the first outcome
    ///
    /// Concurrent callers share a single in-flight open.
    pub async fn init(&self) -> Result<()> {
        let outcome = self
            .init
            .get_or_init(|| async {
                *self.state.write() = CacheState::Initializing;
                match self.store.open().await {
                    Ok(()) => {
                        *self.state.write() = CacheState::Ready;
                        info!(
                            "Asset cache ready ({} store, capacity {} bytes)",
                            self.store.name(),
                            self.config.capacity_bytes
                        );
                        Ok(())
                    }
                    Err(e) => {
                        *self.state.write() = CacheState::Unavailable;
                        warn!("Asset cache disabled, store failed to open: {}", e);
                        Err(InitFailure::from_store(&e))
                    }
                }
            })
            .await;

        outcome.as_ref().map(|_| ()).map_err(InitFailure::to_error)
    }

    /// True once initialization has succeeded
    pub fn is_available(&self) -> bool {
        *self.state.read() == CacheState::Ready
    }

    pub fn state(&self) -> CacheState {
        *self.state.read()
    }

    async fn ready(&self) -> bool {
        self.init().await.is_ok()
    }

    /// Look up an entry
    ///
    /// Returns `Ok(None)` when the cache is unavailable, the key is absent,
    /// the entry is past the staleness window, its schema tag differs, or
    /// `expected_hash` is given and differs from the stored hash.
    pub async fn get(&self, key: &str, expected_hash: Option<&str>) -> Result<Option<CacheEntry>> {
        if !self.ready().await {
            self.metrics.record_miss();
            return Ok(None);
        }

        let tracker = LatencyTracker::start();
        let stored = self.store.get(key).await.map_err(|e| {
            self.metrics.record_read_failure();
            warn!("Cache read for {} failed: {}", key, e);
            CacheError::ReadFailure(e)
        })?;
        self.metrics.record_read_latency(tracker.elapsed());

        let Some(entry) = stored else {
            debug!("Cache miss for {}", key);
            self.metrics.record_miss();
            return Ok(None);
        };

        if entry.is_expired(self.clock.now(), self.config.staleness_window) {
            debug!("Cache entry for {} expired", key);
            self.metrics.record_expired();
            if let Err(e) = self.store.delete(key).await {
                warn!("Failed to drop expired entry {}: {}", key, e);
            }
            return Ok(None);
        }

        if entry.schema_version != self.config.schema_version {
            debug!(
                "Cache entry for {} has schema {}, want {}",
                key, entry.schema_version, self.config.schema_version
            );
            self.metrics.record_invalidation();
            return Ok(None);
        }

        if let Some(expected) = expected_hash {
            if entry.content_hash != expected {
                debug!("Cache entry for {} has stale content hash", key);
                self.metrics.record_invalidation();
                return Ok(None);
            }
        }

        self.metrics.record_hit();
        Ok(Some(entry))
    }

    /// Insert or replace an entry, evicting the oldest entries if needed
    ///
    /// Callers may ignore the result; a failed `set` only means the asset
    /// will be decoded again next time.
    pub async fn set(&self, input: CacheEntryInput) -> Result<()> {
        if !self.ready().await {
            return Ok(());
        }

        let size = input.size();
        if !self.policy.fits(size) {
            return Err(CacheError::EntryTooLarge {
                key: input.identity_key,
                size,
                capacity: self.policy.capacity_bytes,
            });
        }

        let tracker = LatencyTracker::start();
        let snapshot = self.store.list_summaries().await.map_err(|e| {
            self.metrics.record_read_failure();
            CacheError::ReadFailure(e)
        })?;

        let victims = self.policy.plan_upsert(&snapshot, &input.identity_key, size);
        if !victims.is_empty() {
            debug!(
                "Evicting {} entries to make room for {} ({} bytes)",
                victims.len(),
                input.identity_key,
                size
            );
            futures::future::try_join_all(victims.iter().map(|key| self.store.delete(key)))
                .await
                .map_err(|e| self.write_failure(&input.identity_key, e))?;
            self.metrics.record_evictions(victims.len() as u64);
        }

        let key = input.identity_key.clone();
        let entry = input.into_entry(self.clock.now(), &self.config.schema_version);
        self.store
            .put(entry)
            .await
            .map_err(|e| self.write_failure(&key, e))?;

        self.metrics.record_write(size);
        self.metrics.record_write_latency(tracker.elapsed());
        debug!("Cached {} ({} bytes)", key, size);
        Ok(())
    }

    fn write_failure(&self, key: &str, err: StoreError) -> CacheError {
        self.metrics.record_write_failure();
        warn!("Cache write for {} failed: {}", key, err);
        CacheError::WriteFailure(err)
    }

    pub async fn delete(&self, key: &str) -> Result<()> {
        if !self.ready().await {
            return Ok(());
        }
        self.store
            .delete(key)
            .await
            .map_err(|e| self.write_failure(key, e))
    }

    pub async fn clear(&self) -> Result<()> {
        if !self.ready().await {
            return Ok(());
        }
        self.store
            .clear()
            .await
            .map_err(|e| self.write_failure("*", e))?;
        info!("Asset cache cleared");
        Ok(())
    }

    pub async fn stats(&self) -> Result<CacheStats> {
        if !self.ready().await {
            return Ok(CacheStats::default());
        }
        let snapshot = self.store.list_summaries().await.map_err(|e| {
            self.metrics.record_read_failure();
            CacheError::ReadFailure(e)
        })?;
        Ok(CacheStats::from_summaries(&snapshot))
    }

    /// Delete every entry past the staleness window; returns how many
    pub async fn purge_expired(&self) -> Result<usize> {
        if !self.ready().await {
            return Ok(0);
        }
        let snapshot = self.store.list_summaries().await.map_err(|e| {
            self.metrics.record_read_failure();
            CacheError::ReadFailure(e)
        })?;

        let now = self.clock.now();
        let mut purged = 0;
        for summary in snapshot
            .iter()
            .filter(|s| s.is_expired(now, self.config.staleness_window))
        {
            self.store
                .delete(&summary.identity_key)
                .await
                .map_err(|e| self.write_failure(&summary.identity_key, e))?;
            purged += 1;
        }

        if purged > 0 {
            info!("Purged {} expired cache entries", purged);
        }
        Ok(purged)
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn DurableStore> {
        &self.store
    }
}

// =============================================================================
// Tests
// =============================================================================
