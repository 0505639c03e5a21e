//! Cache Eviction Policy
//!
//! Keeps total cached bytes under a capacity budget by removing the
//! least-recently-inserted entries. Eviction is triggered when an insert would
//! push the total over capacity, and then continues down to a lower target
//! (`capacity × headroom`) so the next few inserts do not evict again.
//!
//! Planning is pure; the cache executes the returned deletions.

use super::entry::EntrySummary;
use super::{DEFAULT_CAPACITY_BYTES, DEFAULT_HEADROOM};

/// Eviction policy configuration
#[derive(Debug, Clone, PartialEq)]
pub struct EvictionPolicy {
    /// Hard budget in bytes
    pub capacity_bytes: u64,
    /// Fraction of capacity to evict down to (0.0, 1.0]
    pub headroom: f64,
}

impl Default for EvictionPolicy {
    fn default() -> Self {
        Self {
            capacity_bytes: DEFAULT_CAPACITY_BYTES,
            headroom: DEFAULT_HEADROOM,
        }
    }
}

impl EvictionPolicy {
    pub fn new(capacity_bytes: u64, headroom: f64) -> Self {
        Self {
            capacity_bytes,
            headroom,
        }
    }

    /// Byte level eviction drives the total down to
    ///
    /// Rounded down so the target never exceeds `capacity × headroom`.
    pub fn target_bytes(&self) -> u64 {
        (self.capacity_bytes as f64 * self.headroom).floor() as u64
    }

    /// Whether an entry of `size` bytes can ever be stored
    #[inline]
    pub fn fits(&self, size: u64) -> bool {
        size <= self.capacity_bytes
    }

    /// Plan which entries to remove before inserting `incoming_size` bytes
    ///
    /// Returns identity keys oldest first. Equal `created_at` values are
    /// ordered by key so the plan is deterministic. Empty when the insert
    /// fits without eviction.
    pub fn plan_eviction(&self, entries: &[EntrySummary], incoming_size: u64) -> Vec<String> {
        let current: u64 = entries.iter().map(|e| e.size_bytes).sum();
        if current.saturating_add(incoming_size) <= self.capacity_bytes {
            return Vec::new();
        }

        let target = self.target_bytes();
        let mut candidates: Vec<&EntrySummary> = entries.iter().collect();
        candidates.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.identity_key.cmp(&b.identity_key))
        });

        let mut remaining = current;
        let mut victims = Vec::new();
        for candidate in candidates {
            if remaining.saturating_add(incoming_size) <= target {
                break;
            }
            remaining = remaining.saturating_sub(candidate.size_bytes);
            victims.push(candidate.identity_key.clone());
        }

        victims
    }

    /// Plan for an upsert of `identity_key`
    ///
    /// The existing entry under the same key is replaced rather than added to,
    /// so it is neither counted nor offered as a victim.
    pub fn plan_upsert(
        &self,
        entries: &[EntrySummary],
        identity_key: &str,
        incoming_size: u64,
    ) -> Vec<String> {
        let others: Vec<EntrySummary> = entries
            .iter()
            .filter(|e| e.identity_key != identity_key)
            .cloned()
            .collect();
        self.plan_eviction(&others, incoming_size)
    }
}

// =============================================================================
// Tests
// =============================================================================
