//! Default values for SEENMARK configuration.

/// Maximum write attempts admitted per rate window.
pub const DEFAULT_RATE_LIMIT_MAX_OPS: usize = 60;

/// Length of the sliding rate window (1 minute).
pub const DEFAULT_RATE_LIMIT_WINDOW_MS: u64 = 60_000;

/// Persistent cache entry lifetime (7 days).
pub const DEFAULT_CACHE_TTL_MS: u64 = 7 * 24 * 60 * 60 * 1000;

/// Intersection ratio at which an element counts as visible.
pub const DEFAULT_VISIBILITY_THRESHOLD: f64 = 0.5;

/// How long an element must stay visible before it counts as seen.
pub const DEFAULT_VISIBILITY_DEBOUNCE_MS: u64 = 600;

/// Recency window for warming the cache from the remote store.
pub const DEFAULT_BULK_WINDOW_DAYS: u32 = 7;

/// Maximum records fetched by one warm-up.
pub const DEFAULT_BULK_LIMIT: usize = 500;

/// Key prefix for a user's persistent cache tier.
pub const PERSISTENT_KEY_PREFIX: &str = "seen_items";
