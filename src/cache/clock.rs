//! Clock Module
//!
//! Time sources the cache compares stored expiry instants against.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

// == Clock Trait ==
/// Provides the current instant.
///
/// Readings must be monotonic and on the same timeline as the paired
/// [`Scheduler`](super::Scheduler), otherwise lazy and scheduled expiry
/// disagree about when an entry dies.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> Instant;
}

// == Tokio Clock ==
/// Clock backed by `tokio::time::Instant`.
///
/// Follows the runtime's paused clock under `tokio::time::pause`, which keeps
/// it in step with [`TokioScheduler`](super::TokioScheduler) timers.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

impl Clock for TokioClock {
    fn now(&self) -> Instant {
        tokio::time::Instant::now().into_std()
    }
}

// == Manual Clock ==
/// A clock that only moves when told to.
///
/// Clones share the same reading.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<Instant>>,
}

impl ManualClock {
    /// Creates a clock frozen at the current real instant.
    pub fn new() -> Self {
        Self {
            now: Arc::new(Mutex::new(Instant::now())),
        }
    }

    /// Moves the clock forward by `by`.
    pub fn advance(&self, by: Duration) {
        *self.now.lock() += by;
    }

    /// Moves the clock to `to`. Earlier instants are ignored.
    pub fn set(&self, to: Instant) {
        let mut now = self.now.lock();
        if to > *now {
            *now = to;
        }
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock()
    }
}
