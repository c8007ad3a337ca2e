//! Seen records and the queries that read them back.

use crate::{ItemId, ScopeId, Timestamp, UserId};
use serde::{Deserialize, Serialize};

/// Durable proof that a user has viewed an item.
///
/// Owned by the remote store. Created at most once per `(user_id, item_id)`
/// and immutable afterwards; `seen_at` is always assigned by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeenRecord {
    pub user_id: UserId,
    pub item_id: ItemId,
    pub scope_id: ScopeId,
    pub seen_at: Timestamp,
}

/// Payload for creating a seen record. Carries no timestamp on purpose:
/// the store stamps the record itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSeenRecord {
    pub user_id: UserId,
    pub item_id: ItemId,
    pub scope_id: ScopeId,
}

impl NewSeenRecord {
    pub fn new(user_id: UserId, item_id: ItemId, scope_id: ScopeId) -> Self {
        Self {
            user_id,
            item_id,
            scope_id,
        }
    }

    /// Stamp the payload into a full record.
    pub fn into_record(self, seen_at: Timestamp) -> SeenRecord {
        SeenRecord {
            user_id: self.user_id,
            item_id: self.item_id,
            scope_id: self.scope_id,
            seen_at,
        }
    }
}

/// Bulk read over one user's seen records.
///
/// Equality filter on scope (optional) and a range filter on `seen_at`,
/// ordered most recent first, capped at `limit`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeenQuery {
    pub scope_id: Option<ScopeId>,
    pub since: Timestamp,
    pub limit: usize,
}

impl SeenQuery {
    pub fn new(since: Timestamp, limit: usize) -> Self {
        Self {
            scope_id: None,
            since,
            limit,
        }
    }

    pub fn with_scope(mut self, scope_id: Option<ScopeId>) -> Self {
        self.scope_id = scope_id;
        self
    }

    /// Check whether a record passes the scope and recency filters.
    pub fn matches(&self, record: &SeenRecord) -> bool {
        let scope_ok = self
            .scope_id
            .as_ref()
            .map_or(true, |scope| &record.scope_id == scope);
        scope_ok && record.seen_at >= self.since
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn record(scope: &str, seen_at: Timestamp) -> SeenRecord {
        NewSeenRecord::new("u1".into(), "p1".into(), scope.into()).into_record(seen_at)
    }

    #[test]
    fn test_query_scope_filter() {
        let now = Utc::now();
        let query = SeenQuery::new(now - Duration::days(7), 10).with_scope(Some("c1".into()));
        assert!(query.matches(&record("c1", now)));
        assert!(!query.matches(&record("c2", now)));
    }

    #[test]
    fn test_query_window_is_inclusive() {
        let now = Utc::now();
        let since = now - Duration::days(7);
        let query = SeenQuery::new(since, 10);
        assert!(query.matches(&record("c1", since)));
        assert!(!query.matches(&record("c1", since - Duration::milliseconds(1))));
    }
}
