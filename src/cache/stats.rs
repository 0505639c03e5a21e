//! Aggregate statistics over a snapshot of cache entries

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::entry::EntrySummary;

/// Counts, sizes and age range of the entries currently stored
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub total_items: u64,
    pub total_size_bytes: u64,
    pub oldest_created_at: Option<DateTime<Utc>>,
    pub newest_created_at: Option<DateTime<Utc>>,
}

impl CacheStats {
    /// Aggregate a snapshot; an empty snapshot yields zeros and no timestamps
    pub fn from_summaries(entries: &[EntrySummary]) -> Self {
        entries.iter().fold(Self::default(), |mut stats, entry| {
            stats.total_items += 1;
            stats.total_size_bytes += entry.size_bytes;
            stats.oldest_created_at = Some(match stats.oldest_created_at {
                Some(oldest) => oldest.min(entry.created_at),
                None => entry.created_at,
            });
            stats.newest_created_at = Some(match stats.newest_created_at {
                Some(newest) => newest.max(entry.created_at),
                None => entry.created_at,
            });
            stats
        })
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.total_items == 0
    }
}
