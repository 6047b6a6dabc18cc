//! In-process TTL caches.
//!
//! Each cache is an explicit object owned by whoever needs it, reads the time
//! from an injected clock, and hands out clones so callers can never mutate a
//! cached value in place.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use shared::clock::SharedClock;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct CacheEntry<T> {
    value: T,
    expires_at: DateTime<Utc>,
}

impl<T> CacheEntry<T> {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

fn to_chrono(ttl: Duration) -> chrono::Duration {
    chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::zero())
}

/// A single value with a time-to-live.
#[derive(Debug)]
pub struct TtlCache<T> {
    ttl: chrono::Duration,
    clock: SharedClock,
    entry: RwLock<Option<CacheEntry<T>>>,
}

impl<T: Clone + Send + Sync> TtlCache<T> {
    pub fn new(ttl: Duration, clock: SharedClock) -> Self {
        Self {
            ttl: to_chrono(ttl),
            clock,
            entry: RwLock::new(None),
        }
    }

    /// Cached value if it has not expired.
    pub async fn get(&self) -> Option<T> {
        let now = self.clock.now();
        let entry = self.entry.read().await;
        entry
            .as_ref()
            .filter(|e| e.is_fresh(now))
            .map(|e| e.value.clone())
    }

    pub async fn put(&self, value: T) {
        let expires_at = self.clock.now() + self.ttl;
        let mut entry = self.entry.write().await;
        *entry = Some(CacheEntry { value, expires_at });
    }

    /// Returns the cached value, loading and storing it on a miss.
    pub async fn get_or_load<F, Fut>(&self, load: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        if let Some(value) = self.get().await {
            return value;
        }
        let value = load().await;
        self.put(value.clone()).await;
        value
    }

    /// Forces the next read to miss.
    pub async fn invalidate(&self) {
        let mut entry = self.entry.write().await;
        if let Some(e) = entry.as_mut() {
            e.expires_at = DateTime::<Utc>::MIN_UTC;
        }
    }
}

/// Entry count above which a write first sweeps out expired entries.
const SWEEP_THRESHOLD: usize = 256;

/// Snapshot of a key's invalidation state, taken before loading it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Generation {
    epoch: u64,
    key: u64,
}

#[derive(Debug)]
struct KeyedState<T> {
    entries: HashMap<String, CacheEntry<T>>,
    /// Bumped per key by `invalidate`; only keys ever invalidated appear.
    generations: HashMap<String, u64>,
    /// Bumped by `invalidate_all`.
    epoch: u64,
}

impl<T> KeyedState<T> {
    fn generation(&self, key: &str) -> Generation {
        Generation {
            epoch: self.epoch,
            key: self.generations.get(key).copied().unwrap_or(0),
        }
    }

    fn insert(&mut self, key: String, entry: CacheEntry<T>, now: DateTime<Utc>) {
        if self.entries.len() >= SWEEP_THRESHOLD {
            self.entries.retain(|_, e| e.is_fresh(now));
        }
        self.entries.insert(key, entry);
    }
}

/// A map of independently expiring values.
///
/// Loads that race with an invalidation must not repopulate the cache with
/// the value read before it: take a [`Generation`] before loading and store
/// through [`KeyedTtlCache::put_if_generation`].
#[derive(Debug)]
pub struct KeyedTtlCache<T> {
    ttl: chrono::Duration,
    clock: SharedClock,
    state: RwLock<KeyedState<T>>,
}

impl<T: Clone + Send + Sync> KeyedTtlCache<T> {
    pub fn new(ttl: Duration, clock: SharedClock) -> Self {
        Self {
            ttl: to_chrono(ttl),
            clock,
            state: RwLock::new(KeyedState {
                entries: HashMap::new(),
                generations: HashMap::new(),
                epoch: 0,
            }),
        }
    }

    pub async fn get(&self, key: &str) -> Option<T> {
        let now = self.clock.now();
        let state = self.state.read().await;
        state
            .entries
            .get(key)
            .filter(|e| e.is_fresh(now))
            .map(|e| e.value.clone())
    }

    /// Current generation of `key`.
    pub async fn generation(&self, key: &str) -> Generation {
        self.state.read().await.generation(key)
    }

    pub async fn put(&self, key: impl Into<String>, value: T) {
        let now = self.clock.now();
        let entry = CacheEntry {
            value,
            expires_at: now + self.ttl,
        };
        self.state.write().await.insert(key.into(), entry, now);
    }

    /// Stores `value` only if `key` was not invalidated since `generation`
    /// was taken. Returns whether it was stored.
    pub async fn put_if_generation(
        &self,
        key: impl Into<String>,
        generation: Generation,
        value: T,
    ) -> bool {
        let key = key.into();
        let now = self.clock.now();
        let mut state = self.state.write().await;
        if state.generation(&key) != generation {
            return false;
        }
        let entry = CacheEntry {
            value,
            expires_at: now + self.ttl,
        };
        state.insert(key, entry, now);
        true
    }

    pub async fn invalidate(&self, key: &str) {
        let mut state = self.state.write().await;
        state.entries.remove(key);
        *state.generations.entry(key.to_string()).or_insert(0) += 1;
    }

    pub async fn invalidate_all(&self) {
        let mut state = self.state.write().await;
        state.entries.clear();
        state.epoch += 1;
    }

    /// Number of stored entries, fresh or not.
    pub async fn len(&self) -> usize {
        self.state.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
