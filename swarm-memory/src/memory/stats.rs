//! Aggregate statistics over live (non-expired) entries.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{AccessLevel, EntryType, MemoryEntry};

/// Window for `expiring_within_24h`.
const EXPIRY_HORIZON_HOURS: i64 = 24;

/// Snapshot of namespace usage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryStatistics {
    pub total_entries: usize,
    /// Sum of serialized entry sizes, in bytes.
    pub total_size: u64,
    pub entries_by_type: BTreeMap<EntryType, usize>,
    pub entries_by_access_level: BTreeMap<AccessLevel, usize>,
    pub average_entry_size: u64,
    pub oldest_entry: Option<DateTime<Utc>>,
    pub newest_entry: Option<DateTime<Utc>>,
    pub expiring_within_24h: usize,
    pub partition_count: usize,
    pub cache_entries: usize,
    /// Cache lookups served and missed since the manager was built.
    pub cache_hits: u64,
    pub cache_misses: u64,
}

impl MemoryStatistics {
    /// Aggregate `(entry, serialized_size)` pairs, skipping expired entries.
    pub fn collect<'a>(
        entries: impl IntoIterator<Item = (&'a MemoryEntry, u64)>,
        now: DateTime<Utc>,
    ) -> Self {
        let horizon = now + Duration::hours(EXPIRY_HORIZON_HOURS);
        let mut stats = Self::default();

        for (entry, size) in entries {
            if entry.is_expired(now) {
                continue;
            }
            stats.total_entries += 1;
            stats.total_size += size;
            *stats.entries_by_type.entry(entry.entry_type).or_default() += 1;
            *stats
                .entries_by_access_level
                .entry(entry.access_level)
                .or_default() += 1;

            stats.oldest_entry = Some(match stats.oldest_entry {
                Some(t) => t.min(entry.created_at),
                None => entry.created_at,
            });
            stats.newest_entry = Some(match stats.newest_entry {
                Some(t) => t.max(entry.created_at),
                None => entry.created_at,
            });
            if entry.expires_at.is_some_and(|exp| exp <= horizon) {
                stats.expiring_within_24h += 1;
            }
        }

        if stats.total_entries > 0 {
            stats.average_entry_size = stats.total_size / stats.total_entries as u64;
        }
        stats
    }
}
