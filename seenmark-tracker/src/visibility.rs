//! Debounced visibility detection.
//!
//! A host reports how much of an element is in view through a
//! [`VisibilityFeed`]. A [`VisibilityObserver`] watches one feed and invokes
//! its callback once the ratio has stayed at or above the threshold for the
//! whole debounce period.
//!
//! # State Machine
//!
//! ```text
//! Idle --(ratio >= threshold)--> Armed --(debounce elapsed)--> Fired
//!   ^                              |
//!   +----(ratio < threshold)-------+
//!
//! any non-terminal state --(detach / feed dropped)--> Detached
//! ```
//!
//! `Fired` and `Detached` are terminal. The observer releases its watch on
//! the feed as soon as it reaches either.

use std::sync::{Arc, Weak};

use seenmark_core::VisibilityOptions;
use tokio::sync::watch;
use tokio::time::{sleep_until, Instant};

/// Host-side handle into which an element's intersection ratio is reported.
///
/// Clones share the same element. When every clone is dropped the element
/// counts as unmounted and attached observers detach.
#[derive(Debug, Clone)]
pub struct VisibilityFeed {
    ratio: Arc<watch::Sender<f64>>,
}

impl Default for VisibilityFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl VisibilityFeed {
    /// A feed for an element that starts out of view.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0.0);
        Self { ratio: Arc::new(tx) }
    }

    /// Report the current intersection ratio, clamped to `[0, 1]`.
    /// NaN reads as fully hidden.
    pub fn report(&self, ratio: f64) {
        let clamped = if ratio.is_nan() {
            0.0
        } else {
            ratio.clamp(0.0, 1.0)
        };
        self.ratio.send_replace(clamped);
    }

    pub fn ratio(&self) -> f64 {
        *self.ratio.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<f64> {
        self.ratio.subscribe()
    }

    /// Number of observers currently watching this element.
    pub fn watcher_count(&self) -> usize {
        self.ratio.receiver_count()
    }

    /// A handle that does not keep the element mounted.
    pub fn downgrade(&self) -> WeakVisibilityFeed {
        WeakVisibilityFeed {
            ratio: Arc::downgrade(&self.ratio),
        }
    }
}

/// Non-owning [`VisibilityFeed`] handle.
#[derive(Debug, Clone)]
pub struct WeakVisibilityFeed {
    ratio: Weak<watch::Sender<f64>>,
}

impl WeakVisibilityFeed {
    /// `None` once every owning handle is gone.
    pub fn upgrade(&self) -> Option<VisibilityFeed> {
        self.ratio.upgrade().map(|ratio| VisibilityFeed { ratio })
    }
}

/// Lifecycle of one observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VisibilityState {
    Idle,
    Armed,
    Fired,
    Detached,
}

impl VisibilityState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, VisibilityState::Fired | VisibilityState::Detached)
    }
}

/// Move to `to` unless a terminal state was already reached.
/// Returns whether the state changed.
fn transition(state: &watch::Sender<VisibilityState>, to: VisibilityState) -> bool {
    state.send_if_modified(|current| {
        if current.is_terminal() || *current == to {
            false
        } else {
            *current = to;
            true
        }
    })
}

/// Watches one [`VisibilityFeed`] and fires a callback at most once.
///
/// Dropping the observer detaches it.
#[derive(Debug)]
pub struct VisibilityObserver {
    state: Arc<watch::Sender<VisibilityState>>,
    shutdown: watch::Sender<bool>,
    done: watch::Receiver<bool>,
}

impl VisibilityObserver {
    /// Start watching `feed`. `on_visible` runs at most once, on the runtime
    /// that owns the watch task.
    ///
    /// Outside a tokio runtime there is nothing to drive the debounce timer;
    /// the observer is returned already `Detached`.
    pub fn attach<F>(feed: &VisibilityFeed, options: VisibilityOptions, on_visible: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let (state_tx, _) = watch::channel(VisibilityState::Idle);
        let state = Arc::new(state_tx);
        let (shutdown, shutdown_rx) = watch::channel(false);
        let (done_tx, done) = watch::channel(false);

        let observer = Self {
            state: state.clone(),
            shutdown,
            done,
        };

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                tracing::warn!(error = %e, "Visibility observer attached outside a runtime");
                transition(&state, VisibilityState::Detached);
                done_tx.send_replace(true);
                return observer;
            }
        };

        let ratio_rx = feed.subscribe();
        runtime.spawn(async move {
            let debounce_elapsed = watch_ratio(ratio_rx, shutdown_rx, &state, options).await;

            if debounce_elapsed && transition(&state, VisibilityState::Fired) {
                tracing::debug!(
                    threshold = options.threshold,
                    debounce_ms = options.debounce.as_millis() as u64,
                    "Visibility observer fired"
                );
                on_visible();
            } else {
                transition(&state, VisibilityState::Detached);
            }
            done_tx.send_replace(true);
        });

        observer
    }

    /// Tear down the timer and the watch. Safe to call from any state and
    /// more than once; after `Fired` it does nothing.
    pub fn detach(&self) {
        self.shutdown.send_replace(true);
        if transition(&self.state, VisibilityState::Detached) {
            tracing::debug!("Visibility observer detached");
        }
    }

    pub fn state(&self) -> VisibilityState {
        *self.state.borrow()
    }

    pub fn is_finished(&self) -> bool {
        *self.done.borrow()
    }

    /// Wait until the observer has released its watch on the feed. If it
    /// fired, the callback has returned by then.
    pub async fn finished(&self) {
        let mut done = self.done.clone();
        // An error means the watch task is gone, which is finished too.
        let _ = done.wait_for(|finished| *finished).await;
    }
}

impl Drop for VisibilityObserver {
    fn drop(&mut self) {
        self.detach();
    }
}

/// Drive the Idle/Armed part of the state machine. Returns `true` when the
/// debounce period elapsed while visible, `false` when the observer was
/// detached or the feed went away. Consumes `ratio_rx` so the watch on the
/// feed is released on return.
async fn watch_ratio(
    mut ratio_rx: watch::Receiver<f64>,
    mut shutdown_rx: watch::Receiver<bool>,
    state: &watch::Sender<VisibilityState>,
    options: VisibilityOptions,
) -> bool {
    let mut deadline: Option<Instant> = None;

    loop {
        if *shutdown_rx.borrow_and_update() {
            return false;
        }

        let visible = *ratio_rx.borrow_and_update() >= options.threshold;
        match (visible, deadline) {
            (true, None) => {
                deadline = Some(Instant::now() + options.debounce);
                transition(state, VisibilityState::Armed);
            }
            (false, Some(_)) => {
                deadline = None;
                transition(state, VisibilityState::Idle);
            }
            _ => {}
        }

        tokio::select! {
            biased;

            changed = shutdown_rx.changed() => {
                if changed.is_err() {
                    return false;
                }
            }

            changed = ratio_rx.changed() => {
                if changed.is_err() {
                    tracing::debug!("Visibility feed dropped");
                    return false;
                }
            }

            _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                return true;
            }
        }
    }
}
