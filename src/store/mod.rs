//! Durable Store
//!
//! The cache's persistence port. Backends implement [`DurableStore`]; the
//! cache only ever talks to the trait, so the same logic runs against an
//! in-memory map in tests and a directory of record files in production.
//!
//! ```text
//! ┌──────────────────────────────┐
//! │          AssetCache          │
//! └──────────────┬───────────────┘
//!                │ Arc<dyn DurableStore>
//!       ┌────────┴────────┐
//!       ▼                 ▼
//! ┌─────────────┐   ┌─────────────┐
//! │InMemoryStore│   │  FileStore  │
//! │  (DashMap)  │   │ (records/)  │
//! └─────────────┘   └─────────────┘
//! ```

use async_trait::async_trait;

use crate::cache::{CacheEntry, EntrySummary};
use crate::error::StoreResult;

pub mod compression;
mod file;
mod memory;
mod record;

pub use compression::{CompressionAlgorithm, CompressionConfig};
pub use file::{FileStore, FileStoreConfig, LAYOUT_VERSION};
pub use memory::{InMemoryStore, InMemoryStoreStats};

/// Key/value persistence for cache entries
///
/// Every operation other than `open` fails with
/// [`StoreError::NotOpen`](crate::error::StoreError::NotOpen) until `open`
/// has succeeded. `open` is idempotent and safe to race.
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Short backend name for logs
    fn name(&self) -> &'static str;

    /// Open (creating if absent) and migrate the backing store
    async fn open(&self) -> StoreResult<()>;

    async fn get(&self, key: &str) -> StoreResult<Option<CacheEntry>>;

    /// Insert or replace the entry under `entry.identity_key`
    async fn put(&self, entry: CacheEntry) -> StoreResult<()>;

    /// Remove an entry; absent keys are not an error
    async fn delete(&self, key: &str) -> StoreResult<()>;

    /// Snapshot of every stored entry
    async fn list_all(&self) -> StoreResult<Vec<CacheEntry>>;

    /// Snapshot of every stored entry without payloads
    async fn list_summaries(&self) -> StoreResult<Vec<EntrySummary>> {
        Ok(self.list_all().await?.iter().map(EntrySummary::from).collect())
    }

    async fn clear(&self) -> StoreResult<()>;
}
