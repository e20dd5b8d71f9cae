//! Cache Entry Module
//!
//! Defines the stored value record and the eviction handle paired with it.

use std::time::{Duration, Instant};

/// Stand-in offset for deadlines that would overflow `Instant`, roughly 30 years.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

// == Deadline ==
/// Returns `now + ttl`, clamped to a far-future instant when the sum
/// overflows. Any TTL is accepted, including `Duration::MAX`.
pub(crate) fn deadline_after(now: Instant, ttl: Duration) -> Instant {
    now.checked_add(ttl)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

// == Entry ==
/// Represents a single cache entry: the value and the instant it dies.
#[derive(Debug, Clone)]
pub struct Entry<V> {
    /// The stored value
    pub value: V,
    /// Absolute expiration instant (insertion time + TTL)
    pub expires_at: Instant,
}

impl<V> Entry<V> {
    // == Constructor ==
    /// Creates a new entry that expires `ttl` after `now`.
    pub fn new(value: V, now: Instant, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: deadline_after(now, ttl),
        }
    }

    // == Is Expired ==
    /// Checks if the entry has expired relative to `now`.
    ///
    /// Boundary condition: an entry is expired once `now` reaches the
    /// expiration instant, so a zero TTL is expired immediately.
    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }

    // == Time To Live ==
    /// Returns the time left before expiry, saturating at zero.
    pub fn remaining(&self, now: Instant) -> Duration {
        self.expires_at.saturating_duration_since(now)
    }
}

// == Scheduled Eviction ==
/// A pending eviction registered with the scheduler for one key.
///
/// `id` is unique per registration. A firing callback only removes its key
/// while the registration with the same `id` is still current, so a stale
/// timer can never evict a newer entry stored under the same key.
#[derive(Debug)]
pub struct ScheduledEviction<H> {
    pub id: u64,
    pub handle: H,
}
