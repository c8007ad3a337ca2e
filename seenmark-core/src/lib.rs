//! SEENMARK Core - Entity Types
//!
//! Identifiers, seen records, time sources, configuration and the error
//! taxonomy shared by every other crate. No I/O lives here.

pub mod clock;
pub mod config;
pub mod constants;
pub mod error;
pub mod identity;
pub mod record;

pub use clock::{elapsed_since, Clock, ManualClock, SystemClock};
pub use config::{BulkLoadOptions, CacheConfig, RateLimitConfig, TrackerConfig, VisibilityOptions};
pub use error::{ConfigError, ErrorKind, PersistenceError, RemoteStoreError, SeenError, SeenResult};
pub use identity::{DurationMs, ItemId, ScopeId, Timestamp, UserId};
pub use record::{NewSeenRecord, SeenQuery, SeenRecord};
