use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

/// Upper bound applied to every TTL so `now + ttl` cannot overflow `Instant`.
const MAX_TTL: Duration = Duration::from_secs(60 * 60 * 24 * 365);

/// Snapshot of the cache's invalidation clock, taken before a fetch starts.
///
/// A value fetched under a ticket is only stored if no invalidation of its key
/// (or a full clear) happened after the ticket was taken. The cache tracks
/// live tickets so it can forget invalidations none of them predates; drop
/// the ticket (or hand it to `insert_if_fresh`) once the fetch is over.
#[derive(Debug)]
#[must_use = "a ticket fences only the insert it is handed to"]
pub struct FetchTicket<'a, K, V> {
    cache: &'a TtlCache<K, V>,
    stamp: u64,
}

impl<K, V> Drop for FetchTicket<'_, K, V> {
    fn drop(&mut self) {
        self.cache.write().retire(self.stamp);
    }
}

#[derive(Debug)]
struct Entry<V> {
    value: V,
    expires_at: Instant,
}

#[derive(Debug)]
struct Inner<K, V> {
    entries: HashMap<K, Entry<V>>,
    /// Bumped by every `remove` and `clear`.
    clock: u64,
    /// Clock value of the latest `remove` per key, newer than the oldest live
    /// ticket. Empty while no ticket is live.
    invalidated: HashMap<K, u64>,
    cleared_at: u64,
    /// Live tickets per stamp.
    tickets: BTreeMap<u64, usize>,
}

impl<K, V> Inner<K, V> {
    fn retire(&mut self, stamp: u64) {
        if let Some(live) = self.tickets.get_mut(&stamp) {
            *live -= 1;
            if *live == 0 {
                self.tickets.remove(&stamp);
            }
        }
        self.forget_unobserved();
    }

    /// Drop invalidation stamps that no live ticket can predate.
    fn forget_unobserved(&mut self) {
        match self.tickets.keys().next() {
            None => self.invalidated.clear(),
            Some(&oldest) => self.invalidated.retain(|_, stamp| *stamp > oldest),
        }
    }
}

/// In-memory keyed cache with per-entry absolute expiry.
///
/// - Expiry is lazy: an expired entry reads as absent and is purged on the
///   next `get` touching it, or by `purge_expired`.
/// - A zero TTL never yields an observable entry.
/// - All operations go through one `RwLock`; the expiry check and the value
///   read happen under the same guard.
#[derive(Debug)]
pub struct TtlCache<K, V> {
    inner: RwLock<Inner<K, V>>,
}

impl<K, V> TtlCache<K, V> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                entries: HashMap::new(),
                clock: 0,
                invalidated: HashMap::new(),
                cleared_at: 0,
                tickets: BTreeMap::new(),
            }),
        }
    }

    // A panic while holding the lock cannot leave an entry half-written:
    // every mutation is a single map operation.
    fn read(&self) -> RwLockReadGuard<'_, Inner<K, V>> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner<K, V>> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take a ticket to pair with [`TtlCache::insert_if_fresh`].
    pub fn ticket(&self) -> FetchTicket<'_, K, V> {
        let mut inner = self.write();
        let stamp = inner.clock;
        *inner.tickets.entry(stamp).or_insert(0) += 1;
        FetchTicket { cache: self, stamp }
    }
}

impl<K, V> Default for TtlCache<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn get(&self, key: &K) -> Option<V> {
        self.get_at(key, Instant::now())
    }

    /// `get` evaluated at an explicit instant.
    pub fn get_at(&self, key: &K, now: Instant) -> Option<V> {
        {
            let inner = self.read();
            match inner.entries.get(key) {
                None => return None,
                Some(entry) if now < entry.expires_at => return Some(entry.value.clone()),
                Some(_) => {}
            }
        }

        // Expired: purge, re-checking in case a fresh value landed meanwhile.
        let mut inner = self.write();
        if inner
            .entries
            .get(key)
            .is_some_and(|entry| now >= entry.expires_at)
        {
            inner.entries.remove(key);
        }
        None
    }

    pub fn insert(&self, key: K, value: V, ttl: Duration) {
        self.insert_at(key, value, ttl, Instant::now())
    }

    /// `insert` evaluated at an explicit instant. Overwrites any existing entry.
    pub fn insert_at(&self, key: K, value: V, ttl: Duration, now: Instant) {
        let mut inner = self.write();
        Self::store(&mut inner, key, value, ttl, now);
    }

    /// Insert unless `key` was removed (or the cache cleared) after `ticket`
    /// was taken. Returns whether the value was stored.
    pub fn insert_if_fresh(
        &self,
        key: K,
        value: V,
        ttl: Duration,
        ticket: FetchTicket<'_, K, V>,
    ) -> bool {
        self.insert_if_fresh_at(key, value, ttl, ticket, Instant::now())
    }

    pub fn insert_if_fresh_at(
        &self,
        key: K,
        value: V,
        ttl: Duration,
        ticket: FetchTicket<'_, K, V>,
        now: Instant,
    ) -> bool {
        // The guard must be gone before `ticket` drops and retires itself.
        let mut inner = self.write();
        let stale = inner.cleared_at > ticket.stamp
            || inner
                .invalidated
                .get(&key)
                .is_some_and(|&stamp| stamp > ticket.stamp);
        if !stale {
            Self::store(&mut inner, key, value, ttl, now);
        }
        drop(inner);
        !stale
    }

    /// Remove `key`. Also fences out in-flight fetches holding older tickets.
    pub fn remove(&self, key: &K) {
        let mut inner = self.write();
        inner.entries.remove(key);
        inner.clock += 1;
        let stamp = inner.clock;
        if !inner.tickets.is_empty() {
            inner.invalidated.insert(key.clone(), stamp);
        }
    }

    pub fn clear(&self) {
        let mut inner = self.write();
        inner.entries.clear();
        inner.invalidated.clear();
        inner.clock += 1;
        inner.cleared_at = inner.clock;
    }

    /// Drop every expired entry. Returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        self.purge_expired_at(Instant::now())
    }

    pub fn purge_expired_at(&self, now: Instant) -> usize {
        let mut inner = self.write();
        inner.forget_unobserved();
        let before = inner.entries.len();
        inner.entries.retain(|_, entry| now < entry.expires_at);
        before - inner.entries.len()
    }

    /// Stored entries, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn store(inner: &mut Inner<K, V>, key: K, value: V, ttl: Duration, now: Instant) {
        if ttl.is_zero() {
            inner.entries.remove(&key);
            return;
        }
        let expires_at = now + ttl.min(MAX_TTL);
        inner.entries.insert(key, Entry { value, expires_at });
    }
}
