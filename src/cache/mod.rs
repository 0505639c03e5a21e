//! Asset Cache
//!
//! Embedded cache for expensive-to-decode binary assets (3D model meshes).
//! Entries are keyed by identity key, validated against a content hash and a
//! schema tag, expire after a staleness window, and are evicted oldest-first
//! when the total payload size would exceed capacity.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                       AssetCache                         │
//! │    init / is_available / get / set / delete / clear      │
//! ├──────────────┬──────────────┬──────────────┬────────────┤
//! │IdentityHasher│EvictionPolicy│  CacheStats  │CacheMetrics│
//! └──────────────┴──────────────┴──────────────┴────────────┘
//!                          │
//!                          ▼
//!                 Arc<dyn DurableStore>
//! ```

use std::time::Duration;

mod clock;
mod entry;
mod hasher;
mod manager;
mod metrics;
mod policy;
mod stats;

pub use clock::{Clock, ManualClock, SystemClock};
pub use entry::{BoundingBox, CacheEntry, CacheEntryInput, EntrySummary, MeshMetadata};
pub use hasher::{ContentSource, IdentityHasher};
pub use manager::{AssetCache, CacheConfig, CacheState};
pub use metrics::{CacheMetrics, LatencyTracker, MetricsSnapshot};
pub use policy::EvictionPolicy;
pub use stats::CacheStats;

/// Default capacity: 500 MiB of payload
pub const DEFAULT_CAPACITY_BYTES: u64 = 500 * 1024 * 1024;

/// Eviction drives the total down to 80% of capacity
pub const DEFAULT_HEADROOM: f64 = 0.8;

/// Entries older than a week read as absent
pub const DEFAULT_STALENESS_WINDOW: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Payload format tag for the current mesh encoding
pub const DEFAULT_SCHEMA_VERSION: &str = "mesh-v1";
