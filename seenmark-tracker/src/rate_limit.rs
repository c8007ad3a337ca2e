//! Process-wide sliding-window limit on remote write attempts.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use seenmark_core::{elapsed_since, Clock, RateLimitConfig, Timestamp};

/// Sliding-window rate limiter.
///
/// Holds the timestamps of admitted attempts, oldest first. An attempt is
/// admitted when fewer than `max_ops` timestamps lie within the last
/// `window`; an entry exactly `window` old still counts.
pub struct RateLimiter {
    attempts: Mutex<VecDeque<Timestamp>>,
    max_ops: usize,
    window: Duration,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            attempts: Mutex::new(VecDeque::with_capacity(config.max_ops)),
            max_ops: config.max_ops,
            window: config.window,
            clock,
        }
    }

    /// Admit one attempt if the window has room. A rejection records nothing.
    pub fn try_acquire(&self) -> bool {
        let now = self.clock.now();
        let mut attempts = self.lock();
        self.prune(&mut attempts, now);

        if attempts.len() < self.max_ops {
            attempts.push_back(now);
            true
        } else {
            tracing::debug!(
                max_ops = self.max_ops,
                window_ms = self.window.as_millis() as u64,
                "Rate limit window full"
            );
            false
        }
    }

    /// Admissions left in the current window.
    pub fn remaining(&self) -> usize {
        let now = self.clock.now();
        let mut attempts = self.lock();
        self.prune(&mut attempts, now);
        self.max_ops.saturating_sub(attempts.len())
    }

    pub fn max_ops(&self) -> usize {
        self.max_ops
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    fn prune(&self, attempts: &mut VecDeque<Timestamp>, now: Timestamp) {
        while let Some(oldest) = attempts.front() {
            if elapsed_since(now, *oldest) > self.window {
                attempts.pop_front();
            } else {
                break;
            }
        }
    }

    /// The window is plain data, so a poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, VecDeque<Timestamp>> {
        self.attempts.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("max_ops", &self.max_ops)
            .field("window", &self.window)
            .finish()
    }
}
