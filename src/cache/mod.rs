//! Cache Module
//!
//! Provides in-memory caching with per-entry TTL, lazy expiry on reads and
//! scheduled eviction in the background.

mod clock;
mod entry;
mod key;
mod scheduler;
mod stats;
mod store;


// Re-export public types
pub use clock::{Clock, ManualClock, TokioClock};
pub use entry::{Entry, ScheduledEviction};
pub use key::BlankKey;
pub use scheduler::{ManualHandle, ManualScheduler, Scheduler, Task, TokioScheduler};
pub use stats::CacheStats;
pub use store::{ExpiringCache, ManualCache, DEFAULT_TTL};
