//! Cache Store Module
//!
//! Main cache engine: a value map and a scheduled-eviction map kept in
//! lockstep under one mutex, with lazy expiry on reads and active expiry
//! through the injected scheduler.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::debug;

use crate::cache::{
    BlankKey, CacheStats, Clock, Entry, ManualClock, ManualScheduler, ScheduledEviction,
    Scheduler, TokioClock, TokioScheduler,
};
use crate::error::Result;

/// TTL applied when none is given, at construction or per entry.
pub const DEFAULT_TTL: Duration = Duration::from_secs(60);

/// A cache driven by a [`ManualScheduler`] and its clock.
pub type ManualCache<K, V> = ExpiringCache<K, V, ManualScheduler, ManualClock>;

// == Internal State ==
/// Everything guarded by the cache mutex.
///
/// A key is in `evictions` iff it is in `entries`.
struct State<K, V, H> {
    entries: HashMap<K, Entry<V>>,
    evictions: HashMap<K, ScheduledEviction<H>>,
    next_eviction_id: u64,
    stats: CacheStats,
}

struct Shared<K, V, S: Scheduler, C> {
    state: Mutex<State<K, V, S::Handle>>,
    scheduler: S,
    clock: C,
    default_ttl: Duration,
}

// == Expiring Cache ==
/// In-memory key-value cache where every entry carries its own TTL.
///
/// Each `set` registers a scheduled eviction that removes the entry when its
/// TTL elapses; reads also check expiry and remove stale entries on the spot.
/// Both paths go through the same removal routine, which cancels the pending
/// eviction and drops the value together.
///
/// Cloning is cheap and every clone refers to the same cache. Dropping the
/// last clone cancels all pending evictions.
///
/// # Example
/// ```
/// use std::time::Duration;
/// use expiring_cache::{ManualCache, ManualScheduler};
///
/// let scheduler = ManualScheduler::new();
/// let cache: ManualCache<String, String> =
///     ManualCache::manual(Duration::from_secs(60), &scheduler);
///
/// cache.set_with_ttl("a".to_string(), "1".to_string(), Duration::from_secs(3));
/// assert_eq!(cache.get("a"), Some("1".to_string()));
///
/// scheduler.advance(Duration::from_millis(3500));
/// assert_eq!(cache.get("a"), None);
/// ```
pub struct ExpiringCache<K, V, S: Scheduler = TokioScheduler, C = TokioClock> {
    shared: Arc<Shared<K, V, S, C>>,
}

impl<K, V, S: Scheduler, C> Clone for ExpiringCache<K, V, S, C> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<K, V> ExpiringCache<K, V>
where
    K: Hash + Eq + Clone + Send + 'static,
    V: Clone + Send + 'static,
{
    // == Constructor ==
    /// Creates a cache whose evictions run on the current tokio runtime.
    ///
    /// # Errors
    /// Returns [`CacheError::NoRuntime`](crate::error::CacheError::NoRuntime)
    /// when called outside of a tokio runtime.
    pub fn new(default_ttl: Duration) -> Result<Self> {
        Ok(Self::with_parts(
            default_ttl,
            TokioScheduler::current()?,
            TokioClock,
        ))
    }

    /// Creates a tokio-backed cache with the 60 second [`DEFAULT_TTL`].
    pub fn try_default() -> Result<Self> {
        Self::new(DEFAULT_TTL)
    }
}

impl<K, V> ExpiringCache<K, V, ManualScheduler, ManualClock>
where
    K: Hash + Eq + Clone + Send + 'static,
    V: Clone + Send + 'static,
{
    /// Creates a cache on a manually driven timeline.
    ///
    /// Evictions fire only as `scheduler` is advanced.
    pub fn manual(default_ttl: Duration, scheduler: &ManualScheduler) -> Self {
        Self::with_parts(default_ttl, scheduler.clone(), scheduler.clock().clone())
    }
}

impl<K, V, S, C> ExpiringCache<K, V, S, C>
where
    K: Hash + Eq + Clone + Send + 'static,
    V: Clone + Send + 'static,
    S: Scheduler,
    C: Clock,
{
    /// Creates an empty cache from an explicit scheduler and clock.
    ///
    /// `clock` must read the same timeline `scheduler` measures delays on.
    pub fn with_parts(default_ttl: Duration, scheduler: S, clock: C) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    entries: HashMap::new(),
                    evictions: HashMap::new(),
                    next_eviction_id: 0,
                    stats: CacheStats::new(),
                }),
                scheduler,
                clock,
                default_ttl,
            }),
        }
    }

    /// TTL used by [`set`](Self::set) and refreshing reads.
    pub fn default_ttl(&self) -> Duration {
        self.shared.default_ttl
    }

    // == Set ==
    /// Stores `value` under `key` with the default TTL.
    pub fn set(&self, key: K, value: V) {
        self.set_with_ttl(key, value, self.shared.default_ttl);
    }

    /// Stores `value` under `key`, expiring after `ttl`.
    ///
    /// Any existing entry for `key` is removed first and its pending eviction
    /// cancelled, so only the new entry's eviction remains registered.
    pub fn set_with_ttl(&self, key: K, value: V, ttl: Duration) {
        let mut state = self.shared.state.lock();
        self.insert_locked(&mut state, key, value, ttl);
    }

    // == Get ==
    /// Returns a clone of the value for `key` if it is present and not expired.
    ///
    /// Blank keys miss immediately. An expired entry is removed on the spot.
    /// Reading never extends the entry's lifetime.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + BlankKey + ?Sized,
    {
        let mut state = self.shared.state.lock();
        if !self.shared.check_live_locked(&mut state, key) {
            return None;
        }

        let value = state.entries.get(key).map(|entry| entry.value.clone());
        state.stats.record_hit();
        value
    }

    // == Get And Refresh ==
    /// Like [`get`](Self::get), but a hit re-inserts the entry with the
    /// cache's default TTL.
    ///
    /// The entry's own TTL and whatever time it had left are discarded; the
    /// refreshed entry always lives for the default TTL from now.
    pub fn get_lru<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + BlankKey + ?Sized,
    {
        let mut state = self.shared.state.lock();
        if !self.shared.check_live_locked(&mut state, key) {
            return None;
        }

        let (key, entry) = self.shared.remove_locked(&mut state, key)?;
        let value = entry.value;
        self.insert_locked(&mut state, key, value.clone(), self.shared.default_ttl);
        state.stats.record_hit();
        state.stats.record_refresh();
        Some(value)
    }

    // == Delete ==
    /// Removes `key`, cancelling its pending eviction.
    ///
    /// Returns whether an entry was present.
    pub fn delete<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let mut state = self.shared.state.lock();
        self.shared.remove_locked(&mut state, key).is_some()
    }

    // == Cleanup ==
    /// Removes every entry whose expiry has passed.
    ///
    /// Returns the number of entries removed.
    pub fn cleanup(&self) -> usize {
        let mut state = self.shared.state.lock();
        self.shared.sweep_locked(&mut state)
    }

    // == Size ==
    /// Returns the number of live entries, sweeping expired ones first.
    pub fn size(&self) -> usize {
        let mut state = self.shared.state.lock();
        self.shared.sweep_locked(&mut state);
        state.entries.len()
    }

    /// Returns true if no live entries remain.
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    // == Keys ==
    /// Returns a snapshot of the live keys, in no particular order.
    pub fn keys(&self) -> Vec<K> {
        let mut state = self.shared.state.lock();
        self.shared.sweep_locked(&mut state);
        state.entries.keys().cloned().collect()
    }

    // == Clear ==
    /// Removes every entry and cancels every pending eviction.
    pub fn clear(&self) {
        let mut state = self.shared.state.lock();
        let keys: Vec<K> = state.entries.keys().cloned().collect();
        for key in &keys {
            self.shared.remove_locked(&mut state, key);
        }
        debug!(removed = keys.len(), "Cleared cache");
    }

    // == Remaining TTL ==
    /// Returns how long `key` has left, or `None` if there is no entry.
    ///
    /// This never removes anything: an entry that has expired but not yet
    /// been evicted reports `Some(Duration::ZERO)` rather than `None`.
    pub fn remaining_ttl<Q>(&self, key: &Q) -> Option<Duration>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let state = self.shared.state.lock();
        let now = self.shared.clock.now();
        state.entries.get(key).map(|entry| entry.remaining(now))
    }

    /// Returns true if `key` holds an unexpired entry. Does not remove anything.
    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let state = self.shared.state.lock();
        let now = self.shared.clock.now();
        state
            .entries
            .get(key)
            .map_or(false, |entry| !entry.is_expired(now))
    }

    /// Number of evictions currently registered with the scheduler.
    pub fn pending_evictions(&self) -> usize {
        self.shared.state.lock().evictions.len()
    }

    // == Stats ==
    /// Returns a snapshot of the cache statistics, sweeping expired entries first.
    pub fn stats(&self) -> CacheStats {
        let mut state = self.shared.state.lock();
        self.shared.sweep_locked(&mut state);
        let mut stats = state.stats.clone();
        stats.set_total_entries(state.entries.len());
        stats
    }

    fn insert_locked(&self, state: &mut State<K, V, S::Handle>, key: K, value: V, ttl: Duration) {
        self.shared.remove_locked(state, &key);

        let id = state.next_eviction_id;
        state.next_eviction_id += 1;

        let shared: Weak<Shared<K, V, S, C>> = Arc::downgrade(&self.shared);
        let evicted_key = key.clone();
        let handle = self.shared.scheduler.schedule_after(
            ttl,
            Box::new(move || {
                if let Some(shared) = shared.upgrade() {
                    shared.fire(&evicted_key, id);
                }
            }),
        );

        let now = self.shared.clock.now();
        state.entries.insert(key.clone(), Entry::new(value, now, ttl));
        state.evictions.insert(key, ScheduledEviction { id, handle });
    }
}

impl<K, V, S, C> Shared<K, V, S, C>
where
    K: Hash + Eq + Clone,
    S: Scheduler,
    C: Clock,
{
    /// The single removal path: cancels the eviction and drops the entry.
    fn remove_locked<Q>(
        &self,
        state: &mut State<K, V, S::Handle>,
        key: &Q,
    ) -> Option<(K, Entry<V>)>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        if let Some(eviction) = state.evictions.remove(key) {
            self.scheduler.cancel(eviction.handle);
        }
        state.entries.remove_entry(key)
    }

    /// Returns true if `key` holds a live entry.
    ///
    /// Records a miss otherwise, lazily removing the entry if it has expired.
    fn check_live_locked<Q>(&self, state: &mut State<K, V, S::Handle>, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + BlankKey + ?Sized,
    {
        if key.is_blank() {
            state.stats.record_miss();
            return false;
        }

        let now = self.clock.now();
        let expired = match state.entries.get(key) {
            Some(entry) => entry.is_expired(now),
            None => {
                state.stats.record_miss();
                return false;
            }
        };

        if expired {
            self.remove_locked(state, key);
            state.stats.record_expired();
            state.stats.record_miss();
            debug!("Removed expired entry on read");
            return false;
        }
        true
    }

    fn sweep_locked(&self, state: &mut State<K, V, S::Handle>) -> usize {
        let now = self.clock.now();
        let expired: Vec<K> = state
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            self.remove_locked(state, key);
            state.stats.record_expired();
        }

        if !expired.is_empty() {
            debug!(removed = expired.len(), "Swept expired entries");
        }
        expired.len()
    }

    /// Runs when the eviction registered as `id` for `key` fires.
    ///
    /// Does nothing unless that registration is still the current one for
    /// `key`; a cancelled or superseded eviction never removes anything.
    fn fire(&self, key: &K, id: u64) {
        let mut state = self.state.lock();
        let current = state
            .evictions
            .get(key)
            .map_or(false, |eviction| eviction.id == id);
        if !current {
            debug!(id, "Ignored stale eviction");
            return;
        }

        self.remove_locked(&mut state, key);
        state.stats.record_evicted();
        debug!(id, "Scheduled eviction fired");
    }
}

impl<K, V, S: Scheduler, C> Drop for Shared<K, V, S, C> {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        for (_, eviction) in state.evictions.drain() {
            self.scheduler.cancel(eviction.handle);
        }
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ManualHandle;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::OnceLock;
    use std::time::Instant;

    const SECOND: Duration = Duration::from_secs(1);

    fn ms(millis: u64) -> Duration {
        Duration::from_millis(millis)
    }

    fn manual_cache(default_ttl: Duration) -> (ManualCache<String, String>, ManualScheduler) {
        let scheduler = ManualScheduler::new();
        (ManualCache::manual(default_ttl, &scheduler), scheduler)
    }

    /// A scheduler whose `cancel` does nothing, so stale callbacks still fire.
    #[derive(Clone)]
    struct LeakyScheduler(ManualScheduler);

    impl Scheduler for LeakyScheduler {
        type Handle = ();

        fn schedule_after(&self, delay: Duration, task: crate::cache::Task) -> Self::Handle {
            self.0.schedule_after(delay, task);
        }

        fn cancel(&self, _handle: Self::Handle) {}
    }

    /// Counts cancellations before passing them on to a manual scheduler.
    #[derive(Clone)]
    struct CountingScheduler {
        inner: ManualScheduler,
        cancels: Arc<AtomicUsize>,
    }

    impl Scheduler for CountingScheduler {
        type Handle = ManualHandle;

        fn schedule_after(&self, delay: Duration, task: crate::cache::Task) -> Self::Handle {
            self.inner.schedule_after(delay, task)
        }

        fn cancel(&self, handle: Self::Handle) {
            self.cancels.fetch_add(1, Ordering::SeqCst);
            self.inner.cancel(handle);
        }
    }

    type LockCheck = Box<dyn Fn() -> bool + Send + Sync>;

    /// A manual clock that counts the readings taken while the cache lock is free.
    #[derive(Clone)]
    struct LockCheckedClock {
        inner: ManualClock,
        is_locked: Arc<OnceLock<LockCheck>>,
        reads: Arc<AtomicUsize>,
        unlocked_reads: Arc<AtomicUsize>,
    }

    impl Clock for LockCheckedClock {
        fn now(&self) -> Instant {
            if let Some(is_locked) = self.is_locked.get() {
                self.reads.fetch_add(1, Ordering::SeqCst);
                if !is_locked() {
                    self.unlocked_reads.fetch_add(1, Ordering::SeqCst);
                }
            }
            self.inner.now()
        }
    }

    #[test]
    fn test_new_cache_is_empty() {
        let (cache, scheduler) = manual_cache(SECOND);
        assert_eq!(cache.size(), 0);
        assert!(cache.is_empty());
        assert!(cache.keys().is_empty());
        assert_eq!(cache.pending_evictions(), 0);
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn test_set_and_get() {
        let (cache, scheduler) = manual_cache(SECOND);

        cache.set("key1".to_string(), "value1".to_string());

        assert_eq!(cache.get("key1"), Some("value1".to_string()));
        assert_eq!(cache.size(), 1);
        assert_eq!(cache.pending_evictions(), 1);
        assert_eq!(scheduler.pending(), 1);
    }

    #[test]
    fn test_get_nonexistent() {
        let (cache, _scheduler) = manual_cache(SECOND);
        assert_eq!(cache.get("nonexistent"), None);
    }

    #[test]
    fn test_get_blank_key_misses() {
        let (cache, _scheduler) = manual_cache(SECOND);
        cache.set(String::new(), "value".to_string());

        assert_eq!(cache.get(""), None);
        assert_eq!(cache.get_lru(""), None);
        assert_eq!(cache.stats().misses, 2);
    }

    #[test]
    fn test_default_ttl_is_sixty_seconds() {
        let (cache, scheduler) = manual_cache(DEFAULT_TTL);
        cache.set("k".to_string(), "v".to_string());

        assert_eq!(cache.default_ttl(), Duration::from_secs(60));
        assert_eq!(cache.remaining_ttl("k"), Some(Duration::from_secs(60)));

        scheduler.advance(Duration::from_secs(59));
        assert!(cache.get("k").is_some());
        scheduler.advance(SECOND);
        assert!(cache.get("k").is_none());
    }

    #[test]
    fn test_expiry_scenario() {
        let (cache, scheduler) = manual_cache(Duration::from_secs(60));

        cache.set_with_ttl("a".to_string(), "1".to_string(), ms(3000));
        assert_eq!(cache.get("a"), Some("1".to_string()));

        scheduler.advance(ms(1500));
        assert_eq!(cache.get("a"), Some("1".to_string()));

        scheduler.advance(ms(2000));
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.size(), 0);
    }

    #[test]
    fn test_scheduled_eviction_removes_without_reads() {
        let (cache, scheduler) = manual_cache(SECOND);
        cache.set_with_ttl("a".to_string(), "1".to_string(), ms(100));

        scheduler.advance(ms(100));

        assert_eq!(cache.pending_evictions(), 0);
        assert_eq!(cache.remaining_ttl("a"), None);
        let stats = cache.stats();
        assert_eq!(stats.evicted, 1);
        assert_eq!(stats.expired, 0);
    }

    #[test]
    fn test_overwrite_replaces_value_and_eviction() {
        let (cache, scheduler) = manual_cache(SECOND);

        cache.set("b".to_string(), "x".to_string());
        cache.set("b".to_string(), "y".to_string());

        assert_eq!(cache.get("b"), Some("y".to_string()));
        assert_eq!(cache.size(), 1);
        assert_eq!(cache.pending_evictions(), 1);
        assert_eq!(scheduler.pending(), 1);
    }

    #[test]
    fn test_overwrite_with_longer_ttl_survives_old_deadline() {
        let (cache, scheduler) = manual_cache(SECOND);

        cache.set_with_ttl("k".to_string(), "old".to_string(), ms(100));
        cache.set_with_ttl("k".to_string(), "new".to_string(), ms(1000));

        scheduler.advance(ms(500));
        assert_eq!(cache.get("k"), Some("new".to_string()));
    }

    #[test]
    fn test_delete_returns_true_then_false() {
        let (cache, scheduler) = manual_cache(SECOND);
        cache.set("key1".to_string(), "value1".to_string());

        assert!(cache.delete("key1"));
        assert!(!cache.delete("key1"));
        assert_eq!(cache.get("key1"), None);
        assert_eq!(cache.pending_evictions(), 0);
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn test_delete_then_reuse_key_is_not_hit_by_old_timer() {
        let (cache, scheduler) = manual_cache(SECOND);

        cache.set_with_ttl("a".to_string(), "first".to_string(), ms(100));
        cache.delete("a");
        cache.set_with_ttl("a".to_string(), "second".to_string(), ms(1000));

        scheduler.advance(ms(150));
        assert_eq!(cache.get("a"), Some("second".to_string()));
    }

    #[test]
    fn test_stale_eviction_cannot_remove_newer_entry() {
        let scheduler = ManualScheduler::new();
        let cache: ExpiringCache<String, String, LeakyScheduler, ManualClock> =
            ExpiringCache::with_parts(
                SECOND,
                LeakyScheduler(scheduler.clone()),
                scheduler.clock().clone(),
            );

        cache.set_with_ttl("a".to_string(), "first".to_string(), ms(100));
        cache.set_with_ttl("a".to_string(), "second".to_string(), ms(1000));

        // The first callback still runs because cancel is a no-op here.
        scheduler.advance(ms(150));
        assert_eq!(cache.get("a"), Some("second".to_string()));
        assert_eq!(cache.stats().evicted, 0);

        scheduler.advance(ms(1000));
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.stats().evicted, 1);
    }

    #[test]
    fn test_get_never_extends_ttl() {
        let (cache, scheduler) = manual_cache(SECOND);
        cache.set_with_ttl("k".to_string(), "v".to_string(), ms(100));

        scheduler.advance(ms(60));
        assert!(cache.get("k").is_some());
        assert_eq!(cache.remaining_ttl("k"), Some(ms(40)));
    }

    #[test]
    fn test_get_lru_refreshes_with_default_ttl() {
        let (cache, scheduler) = manual_cache(ms(100));
        cache.set_with_ttl("k".to_string(), "v".to_string(), ms(100));

        scheduler.advance(ms(90));
        assert_eq!(cache.get_lru("k"), Some("v".to_string()));

        scheduler.advance(ms(90));
        assert_eq!(cache.get("k"), Some("v".to_string()));
        assert_eq!(cache.pending_evictions(), 1);
        assert_eq!(scheduler.pending(), 1);
    }

    #[test]
    fn test_get_lru_discards_entry_ttl() {
        let (cache, scheduler) = manual_cache(ms(50));
        cache.set_with_ttl("k".to_string(), "v".to_string(), SECOND);

        assert_eq!(cache.get_lru("k"), Some("v".to_string()));
        assert_eq!(cache.remaining_ttl("k"), Some(ms(50)));

        scheduler.advance(ms(50));
        assert_eq!(cache.get("k"), None);
    }

    #[test]
    fn test_get_lru_on_expired_entry_misses() {
        let (cache, scheduler) = manual_cache(SECOND);
        cache.set_with_ttl("k".to_string(), "v".to_string(), ms(10));

        // Clock moves but the eviction queue is never driven.
        scheduler.clock().advance(ms(20));

        assert_eq!(cache.get_lru("k"), None);
        assert_eq!(cache.remaining_ttl("k"), None);
        assert_eq!(cache.stats().expired, 1);
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn test_remaining_ttl_sentinels() {
        let scheduler = ManualScheduler::new();
        let cache: ManualCache<String, String> = ManualCache::manual(SECOND, &scheduler);
        cache.set_with_ttl("k".to_string(), "v".to_string(), ms(100));

        assert_eq!(cache.remaining_ttl("never"), None);
        assert_eq!(cache.remaining_ttl("k"), Some(ms(100)));

        // Move the clock without firing evictions: expired but still present.
        scheduler.clock().advance(ms(150));
        assert_eq!(cache.remaining_ttl("k"), Some(Duration::ZERO));
        assert_eq!(cache.remaining_ttl("k"), Some(Duration::ZERO));
        assert!(!cache.contains("k"));
        assert_eq!(cache.pending_evictions(), 1);

        // A read removes it, after which it is absent.
        assert_eq!(cache.get("k"), None);
        assert_eq!(cache.remaining_ttl("k"), None);
        assert_eq!(cache.pending_evictions(), 0);
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn test_size_and_keys_sweep_before_timers_fire() {
        let scheduler = ManualScheduler::new();
        let cache: ManualCache<String, String> = ManualCache::manual(SECOND, &scheduler);

        cache.set_with_ttl("short1".to_string(), "v".to_string(), ms(100));
        cache.set_with_ttl("short2".to_string(), "v".to_string(), ms(200));
        cache.set_with_ttl("long1".to_string(), "v".to_string(), ms(5000));
        cache.set_with_ttl("long2".to_string(), "v".to_string(), ms(6000));

        scheduler.clock().advance(ms(300));

        assert_eq!(cache.size(), 2);
        let mut keys = cache.keys();
        keys.sort();
        assert_eq!(keys, vec!["long1".to_string(), "long2".to_string()]);
        assert_eq!(cache.pending_evictions(), 2);
        assert_eq!(scheduler.pending(), 2);
    }

    #[test]
    fn test_cleanup_returns_removed_count() {
        let scheduler = ManualScheduler::new();
        let cache: ManualCache<String, String> = ManualCache::manual(SECOND, &scheduler);

        cache.set_with_ttl("key1".to_string(), "value1".to_string(), ms(100));
        cache.set_with_ttl("key2".to_string(), "value2".to_string(), ms(10_000));

        scheduler.clock().advance(ms(150));

        assert_eq!(cache.cleanup(), 1);
        assert_eq!(cache.cleanup(), 0);
        assert_eq!(cache.size(), 1);
        assert!(cache.get("key2").is_some());
    }

    #[test]
    fn test_clear_cancels_all_evictions() {
        let (cache, scheduler) = manual_cache(SECOND);
        for i in 0..5 {
            cache.set(format!("key{}", i), "v".to_string());
        }
        assert_eq!(scheduler.pending(), 5);

        cache.clear();

        assert_eq!(cache.size(), 0);
        assert_eq!(cache.pending_evictions(), 0);
        assert_eq!(scheduler.pending(), 0);

        // A reused key is unaffected by the old deadlines.
        scheduler.advance(ms(500));
        cache.set("key0".to_string(), "fresh".to_string());
        scheduler.advance(ms(600));
        assert_eq!(cache.get("key0"), Some("fresh".to_string()));
    }

    #[test]
    fn test_drop_cancels_pending_evictions() {
        let (cache, scheduler) = manual_cache(SECOND);
        cache.set("a".to_string(), "1".to_string());
        cache.set("b".to_string(), "2".to_string());

        let clone = cache.clone();
        drop(cache);
        assert_eq!(scheduler.pending(), 2);

        drop(clone);
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn test_eviction_after_drop_is_harmless() {
        let scheduler = ManualScheduler::new();
        let cache: ExpiringCache<String, String, LeakyScheduler, ManualClock> =
            ExpiringCache::with_parts(
                SECOND,
                LeakyScheduler(scheduler.clone()),
                scheduler.clock().clone(),
            );
        cache.set("a".to_string(), "1".to_string());
        drop(cache);

        scheduler.advance(Duration::from_secs(2));
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn test_zero_ttl_entry_is_never_visible() {
        let (cache, scheduler) = manual_cache(SECOND);
        cache.set_with_ttl("k".to_string(), "v".to_string(), Duration::ZERO);

        assert_eq!(cache.get("k"), None);
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn test_stats_counts() {
        let (cache, scheduler) = manual_cache(SECOND);

        cache.set("a".to_string(), "1".to_string());
        cache.set_with_ttl("b".to_string(), "2".to_string(), ms(10));
        cache.get("a"); // hit
        cache.get_lru("a"); // hit + refresh
        cache.get("missing"); // miss
        scheduler.advance(ms(10));

        let stats = cache.stats();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.refreshes, 1);
        assert_eq!(stats.evicted, 1);
        assert_eq!(stats.total_entries, 1);
    }

    #[test]
    fn test_numeric_keys() {
        let scheduler = ManualScheduler::new();
        let cache: ManualCache<u64, &'static str> = ManualCache::manual(SECOND, &scheduler);

        cache.set(0, "zero");
        assert_eq!(cache.get(&0), Some("zero"));
        assert_eq!(cache.get_lru(&0), Some("zero"));
        assert!(cache.delete(&0));
    }

    #[test]
    fn test_unbounded_ttl_replaces_entry() {
        let (cache, scheduler) = manual_cache(SECOND);

        cache.set("k".to_string(), "old".to_string());
        cache.set_with_ttl("k".to_string(), "v".to_string(), Duration::MAX);

        assert_eq!(cache.get("k"), Some("v".to_string()));
        assert_eq!(cache.pending_evictions(), 1);
        assert_eq!(scheduler.pending(), 1);

        scheduler.advance(Duration::from_secs(86400 * 365));
        assert_eq!(cache.get("k"), Some("v".to_string()));
        assert!(cache.remaining_ttl("k").is_some_and(|ttl| ttl > Duration::ZERO));
        assert_eq!(scheduler.pending(), 1);
    }

    #[test]
    fn test_scheduled_eviction_goes_through_removal_path() {
        let scheduler = ManualScheduler::new();
        let counting = CountingScheduler {
            inner: scheduler.clone(),
            cancels: Arc::default(),
        };
        let cache: ExpiringCache<String, String, CountingScheduler, ManualClock> =
            ExpiringCache::with_parts(SECOND, counting.clone(), scheduler.clock().clone());

        cache.set_with_ttl("a".to_string(), "1".to_string(), ms(100));
        cache.set_with_ttl("b".to_string(), "2".to_string(), ms(100));

        assert!(cache.delete("a"));
        assert_eq!(counting.cancels.load(Ordering::SeqCst), 1);

        // The firing eviction releases its handle the same way delete does.
        scheduler.advance(ms(100));
        assert_eq!(counting.cancels.load(Ordering::SeqCst), 2);
        assert_eq!(cache.pending_evictions(), 0);
        assert_eq!(cache.size(), 0);
        assert_eq!(scheduler.pending(), 0);
        assert_eq!(cache.stats().evicted, 1);
    }

    #[test]
    fn test_clock_is_read_under_the_lock() {
        let scheduler = ManualScheduler::new();
        let clock = LockCheckedClock {
            inner: scheduler.clock().clone(),
            is_locked: Arc::default(),
            reads: Arc::default(),
            unlocked_reads: Arc::default(),
        };
        let cache: ExpiringCache<String, String, ManualScheduler, LockCheckedClock> =
            ExpiringCache::with_parts(SECOND, scheduler.clone(), clock.clone());

        let shared = Arc::downgrade(&cache.shared);
        let installed = clock.is_locked.set(Box::new(move || {
            shared
                .upgrade()
                .map_or(true, |shared| shared.state.is_locked())
        }));
        assert!(installed.is_ok());

        cache.set_with_ttl("k".to_string(), "v".to_string(), ms(100));
        scheduler.clock().advance(ms(150));

        assert_eq!(cache.remaining_ttl("k"), Some(Duration::ZERO));
        assert!(!cache.contains("k"));
        assert_eq!(cache.get("k"), None);
        assert_eq!(cache.size(), 0);

        assert!(clock.reads.load(Ordering::SeqCst) >= 5);
        assert_eq!(clock.unlocked_reads.load(Ordering::SeqCst), 0);
    }
}
