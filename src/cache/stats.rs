//! Cache Statistics Module
//!
//! Tracks read outcomes and how entries left the cache.

use serde::Serialize;

// == Cache Stats ==
/// Tracks cache performance and expiry metrics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Number of reads that returned a value
    pub hits: u64,
    /// Number of reads that returned nothing (blank, missing or expired key)
    pub misses: u64,
    /// Entries removed lazily because a read or sweep found them expired
    pub expired: u64,
    /// Entries removed by their scheduled eviction firing
    pub evicted: u64,
    /// Successful refreshing reads
    pub refreshes: u64,
    /// Current number of entries in the cache
    pub total_entries: usize,
}

impl CacheStats {
    // == Constructor ==
    /// Creates a new CacheStats with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    // == Hit Rate ==
    /// Calculates the cache hit rate.
    ///
    /// Returns hits / (hits + misses), or 0.0 if no reads have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub fn record_expired(&mut self) {
        self.expired += 1;
    }

    pub fn record_evicted(&mut self) {
        self.evicted += 1;
    }

    pub fn record_refresh(&mut self) {
        self.refreshes += 1;
    }

    // == Update Entry Count ==
    /// Updates the total entries count.
    pub fn set_total_entries(&mut self, count: usize) {
        self.total_entries = count;
    }
}
