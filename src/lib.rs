//! Asset Cache - Embedded Cache for Decoded Binary Assets
//!
//! A capacity-bounded, integrity-checked cache that keeps decoded 3D model
//! buffers so they need not be parsed again. Entries are validated by content
//! hash and schema tag, expire after a staleness window, and are evicted
//! oldest-first once the total size would exceed capacity.
//!
//! # Architecture
//!
//! ```text
//! caller ──▶ AssetCache ──▶ EvictionPolicy / CacheStats
//!                 │
//!                 ▼
//!          DurableStore (InMemoryStore | FileStore)
//! ```
//!
//! # Modules
//!
//! - [`cache`] - Cache facade, entries, hashing, eviction and stats
//! - [`store`] - Durable store port and its backends
//! - [`error`] - Error types
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use asset_cache::{AssetCache, CacheEntryInput, FileStore, MeshMetadata};
//!
//! # async fn demo() -> asset_cache::Result<()> {
//! let cache = AssetCache::new(Arc::new(FileStore::new("/var/cache/assets")));
//! let input = CacheEntryInput::new("props/crate.ydr", vec![0u8; 64].into(), MeshMetadata::default());
//! let hash = input.content_hash.clone();
//!
//! cache.set(input).await?;
//! let hit = cache.get("props/crate.ydr", Some(&hash)).await?;
//! assert!(hit.is_some());
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod error;
pub mod store;

pub use cache::{
    AssetCache, BoundingBox, CacheConfig, CacheEntry, CacheEntryInput, CacheState, CacheStats,
    ContentSource, EntrySummary, EvictionPolicy, IdentityHasher, MeshMetadata, MetricsSnapshot,
};
pub use error::{CacheError, Result, StoreError, StoreResult};
pub use store::{DurableStore, FileStore, FileStoreConfig, InMemoryStore};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
