//! SEENMARK Tracker - Seen-Record Write Path
//!
//! Turns "this post has been on screen long enough" into at most one remote
//! seen record per (user, item):
//!
//! - [`VisibilityObserver`] debounces visibility reports from a [`VisibilityFeed`]
//! - [`SeenWriteCoordinator`] consults the dedup cache and the [`RateLimiter`],
//!   then writes idempotently
//! - [`BulkSeenLoader`] warms the cache at session start
//! - [`SeenSession`] owns the shared pieces and wires them per rendered item

pub mod coordinator;
pub mod loader;
pub mod rate_limit;
pub mod session;
pub mod visibility;

pub use coordinator::{SeenWriteCoordinator, WriteOutcome};
pub use loader::BulkSeenLoader;
pub use rate_limit::RateLimiter;
pub use session::{SeenSession, TrackedItem};
pub use visibility::{VisibilityFeed, VisibilityObserver, VisibilityState, WeakVisibilityFeed};
