//! Scheduler Module
//!
//! Deferred-callback facilities used to evict entries when their TTL elapses.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::cache::entry::deadline_after;
use crate::cache::{Clock, ManualClock};
use crate::error::{CacheError, Result};

/// A callback to run once its delay has elapsed.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

// == Scheduler Trait ==
/// Runs callbacks after a delay and lets pending ones be cancelled.
///
/// Implementations must never run `task` synchronously from inside
/// `schedule_after`: the cache registers evictions while holding its lock.
/// Cancelling a handle whose callback already ran, or was already cancelled,
/// must be a no-op.
pub trait Scheduler: Send + Sync + 'static {
    type Handle: Send + 'static;

    fn schedule_after(&self, delay: Duration, task: Task) -> Self::Handle;

    fn cancel(&self, handle: Self::Handle);
}

// == Tokio Scheduler ==
/// Spawns one sleeping task per callback on a tokio runtime.
///
/// The deadline is fixed when the callback is scheduled, not when the
/// spawned task first gets polled.
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    runtime: Handle,
}

impl TokioScheduler {
    /// Creates a scheduler that spawns onto `runtime`.
    pub fn new(runtime: Handle) -> Self {
        Self { runtime }
    }

    /// Creates a scheduler bound to the runtime of the calling context.
    ///
    /// Fails with [`CacheError::NoRuntime`] outside of a tokio runtime.
    pub fn current() -> Result<Self> {
        Handle::try_current()
            .map(Self::new)
            .map_err(|_| CacheError::NoRuntime)
    }
}

impl Scheduler for TokioScheduler {
    type Handle = JoinHandle<()>;

    fn schedule_after(&self, delay: Duration, task: Task) -> Self::Handle {
        let now = tokio::time::Instant::now().into_std();
        let deadline = tokio::time::Instant::from_std(deadline_after(now, delay));
        self.runtime.spawn(async move {
            tokio::time::sleep_until(deadline).await;
            task();
        })
    }

    fn cancel(&self, handle: Self::Handle) {
        handle.abort();
    }
}

// == Manual Scheduler ==
/// A deterministic scheduler driven by a [`ManualClock`].
///
/// Nothing fires until [`advance`](ManualScheduler::advance) is called.
/// Clones share the same queue and clock.
#[derive(Clone)]
pub struct ManualScheduler {
    clock: ManualClock,
    queue: Arc<Mutex<ManualQueue>>,
}

#[derive(Default)]
struct ManualQueue {
    next_seq: u64,
    tasks: BTreeMap<(Instant, u64), Task>,
}

/// Handle to a callback queued on a [`ManualScheduler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManualHandle {
    deadline: Instant,
    seq: u64,
}

impl ManualScheduler {
    /// Creates a scheduler with its own fresh clock.
    pub fn new() -> Self {
        Self::with_clock(ManualClock::new())
    }

    /// Creates a scheduler whose deadlines are measured on `clock`.
    pub fn with_clock(clock: ManualClock) -> Self {
        Self {
            clock,
            queue: Arc::new(Mutex::new(ManualQueue::default())),
        }
    }

    /// The clock this scheduler reads and advances.
    pub fn clock(&self) -> &ManualClock {
        &self.clock
    }

    /// Number of callbacks still waiting to fire.
    pub fn pending(&self) -> usize {
        self.queue.lock().tasks.len()
    }

    /// Moves time forward by `by`, running every callback that falls due.
    ///
    /// Callbacks run in deadline order (ties in scheduling order) with the
    /// clock set to their deadline. The queue lock is released while a
    /// callback runs, so callbacks may schedule or cancel freely.
    pub fn advance(&self, by: Duration) {
        let target = deadline_after(self.clock.now(), by);

        loop {
            let next = {
                let mut queue = self.queue.lock();
                let due = queue
                    .tasks
                    .first_key_value()
                    .map_or(false, |((deadline, _), _)| *deadline <= target);
                if due {
                    queue.tasks.pop_first()
                } else {
                    None
                }
            };

            match next {
                Some(((deadline, _), task)) => {
                    self.clock.set(deadline);
                    task();
                }
                None => break,
            }
        }

        self.clock.set(target);
    }
}

impl Default for ManualScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for ManualScheduler {
    type Handle = ManualHandle;

    fn schedule_after(&self, delay: Duration, task: Task) -> Self::Handle {
        let deadline = deadline_after(self.clock.now(), delay);
        let mut queue = self.queue.lock();
        let seq = queue.next_seq;
        queue.next_seq += 1;
        queue.tasks.insert((deadline, seq), task);
        ManualHandle { deadline, seq }
    }

    fn cancel(&self, handle: Self::Handle) {
        self.queue.lock().tasks.remove(&(handle.deadline, handle.seq));
    }
}
