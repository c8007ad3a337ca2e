//! TTL freshness for persistent-tier entries.
//!
//! The persistent tier stores one timestamp per item. An entry is fresh while
//! `now - timestamp < ttl`; at exactly `ttl` it is expired. Expired entries
//! are hidden from reads and dropped on the next write for that user.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::DateTime;
use seenmark_core::{elapsed_since, ItemId, Timestamp};
use serde::{Deserialize, Serialize};

/// One user's persistent seen map, as stored.
pub type PersistedSeenMap = BTreeMap<ItemId, PersistedEntry>;

/// A persistent-tier entry: when the item was last marked seen locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedEntry {
    /// Unix milliseconds. Always the writer's clock, never caller input.
    pub timestamp: i64,
}

impl PersistedEntry {
    pub fn stamped(now: Timestamp) -> Self {
        Self {
            timestamp: now.timestamp_millis(),
        }
    }

    pub fn stamped_at(&self) -> Option<Timestamp> {
        DateTime::from_timestamp_millis(self.timestamp)
    }

    /// How old the entry is. `None` when the stored timestamp is out of range.
    pub fn age(&self, now: Timestamp) -> Option<Duration> {
        self.stamped_at().map(|at| elapsed_since(now, at))
    }

    /// An unreadable timestamp counts as expired.
    pub fn is_fresh(&self, now: Timestamp, ttl: Duration) -> bool {
        self.age(now).is_some_and(|age| age < ttl)
    }
}

/// Drop expired entries in place. Returns how many were removed.
pub fn prune_expired(map: &mut PersistedSeenMap, now: Timestamp, ttl: Duration) -> usize {
    let before = map.len();
    map.retain(|_, entry| entry.is_fresh(now, ttl));
    before - map.len()
}

/// Iterate over the items whose entries are still fresh.
pub fn fresh_items(
    map: &PersistedSeenMap,
    now: Timestamp,
    ttl: Duration,
) -> impl Iterator<Item = &ItemId> {
    map.iter()
        .filter(move |(_, entry)| entry.is_fresh(now, ttl))
        .map(|(item, _)| item)
}
