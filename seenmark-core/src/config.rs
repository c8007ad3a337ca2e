//! Configuration types
//!
//! Every value has a default taken from [`crate::constants`]. Deployments can
//! override them through `SEENMARK_*` environment variables via
//! [`TrackerConfig::from_env`].

use crate::constants::*;
use crate::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Sliding-window limit on remote write attempts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub max_ops: usize,
    /// Length of the sliding window.
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_ops: DEFAULT_RATE_LIMIT_MAX_OPS,
            window: Duration::from_millis(DEFAULT_RATE_LIMIT_WINDOW_MS),
        }
    }
}

/// Dedup cache settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Persistent tier entry lifetime.
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_millis(DEFAULT_CACHE_TTL_MS),
        }
    }
}

/// Threshold and debounce for a visibility observer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VisibilityOptions {
    /// Intersection ratio in (0, 1] at which the element counts as visible.
    pub threshold: f64,
    /// Continuous visibility required before firing.
    pub debounce: Duration,
}

impl Default for VisibilityOptions {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_VISIBILITY_THRESHOLD,
            debounce: Duration::from_millis(DEFAULT_VISIBILITY_DEBOUNCE_MS),
        }
    }
}

impl VisibilityOptions {
    pub fn new(threshold: f64, debounce: Duration) -> Self {
        Self {
            threshold,
            debounce,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.threshold > 0.0 && self.threshold <= 1.0) {
            return Err(ConfigError::InvalidValue {
                field: "visibility.threshold".to_string(),
                value: self.threshold.to_string(),
                reason: "must be in (0, 1]".to_string(),
            });
        }
        if self.debounce.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "visibility.debounce".to_string(),
                value: "0".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        Ok(())
    }
}

/// Bounds on the session-start cache warm-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkLoadOptions {
    pub window_days: u32,
    pub limit: usize,
}

impl Default for BulkLoadOptions {
    fn default() -> Self {
        Self {
            window_days: DEFAULT_BULK_WINDOW_DAYS,
            limit: DEFAULT_BULK_LIMIT,
        }
    }
}

impl BulkLoadOptions {
    pub fn new(window_days: u32, limit: usize) -> Self {
        Self { window_days, limit }
    }

    pub fn window(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.window_days))
    }
}

/// Master configuration struct.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TrackerConfig {
    pub rate_limit: RateLimitConfig,
    pub cache: CacheConfig,
    pub visibility: VisibilityOptions,
    pub bulk_load: BulkLoadOptions,
}

impl TrackerConfig {
    /// Create TrackerConfig from environment variables.
    ///
    /// Environment variables:
    /// - `SEENMARK_RATE_LIMIT_MAX_OPS`: Attempts per window (default: 60)
    /// - `SEENMARK_RATE_LIMIT_WINDOW_MS`: Window length (default: 60000)
    /// - `SEENMARK_CACHE_TTL_MS`: Persistent tier TTL (default: 604800000)
    /// - `SEENMARK_VISIBILITY_THRESHOLD`: Intersection ratio (default: 0.5)
    /// - `SEENMARK_VISIBILITY_DEBOUNCE_MS`: Debounce (default: 600)
    /// - `SEENMARK_BULK_WINDOW_DAYS`: Warm-up recency window (default: 7)
    /// - `SEENMARK_BULK_LIMIT`: Warm-up record cap (default: 500)
    ///
    /// Unparseable values fall back to the default.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parsed<T: std::str::FromStr>(value: Option<String>, default: T) -> T {
            value.and_then(|s| s.trim().parse().ok()).unwrap_or(default)
        }

        Self {
            rate_limit: RateLimitConfig {
                max_ops: parsed(
                    lookup("SEENMARK_RATE_LIMIT_MAX_OPS"),
                    DEFAULT_RATE_LIMIT_MAX_OPS,
                ),
                window: Duration::from_millis(parsed(
                    lookup("SEENMARK_RATE_LIMIT_WINDOW_MS"),
                    DEFAULT_RATE_LIMIT_WINDOW_MS,
                )),
            },
            cache: CacheConfig {
                ttl: Duration::from_millis(parsed(
                    lookup("SEENMARK_CACHE_TTL_MS"),
                    DEFAULT_CACHE_TTL_MS,
                )),
            },
            visibility: VisibilityOptions {
                threshold: parsed(
                    lookup("SEENMARK_VISIBILITY_THRESHOLD"),
                    DEFAULT_VISIBILITY_THRESHOLD,
                ),
                debounce: Duration::from_millis(parsed(
                    lookup("SEENMARK_VISIBILITY_DEBOUNCE_MS"),
                    DEFAULT_VISIBILITY_DEBOUNCE_MS,
                )),
            },
            bulk_load: BulkLoadOptions {
                window_days: parsed(lookup("SEENMARK_BULK_WINDOW_DAYS"), DEFAULT_BULK_WINDOW_DAYS),
                limit: parsed(lookup("SEENMARK_BULK_LIMIT"), DEFAULT_BULK_LIMIT),
            },
        }
    }

    /// Short windows for local development.
    pub fn development() -> Self {
        Self {
            rate_limit: RateLimitConfig {
                max_ops: 600,
                window: Duration::from_secs(60),
            },
            cache: CacheConfig {
                ttl: Duration::from_secs(3600),
            },
            visibility: VisibilityOptions::new(0.5, Duration::from_millis(300)),
            bulk_load: BulkLoadOptions::new(1, 100),
        }
    }

    /// Validate the configuration.
    ///
    /// Validates:
    /// - rate_limit.max_ops > 0 and a non-zero window
    /// - cache.ttl is positive
    /// - visibility threshold in (0, 1] and positive debounce
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rate_limit.max_ops == 0 {
            return Err(ConfigError::InvalidValue {
                field: "rate_limit.max_ops".to_string(),
                value: "0".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        if self.rate_limit.window.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "rate_limit.window".to_string(),
                value: "0".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        if self.cache.ttl.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "cache.ttl".to_string(),
                value: "0".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        self.visibility.validate()
    }
}
