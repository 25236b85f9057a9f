// File: src/cache/timed_cache.rs

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

use crate::utils::time::Clock;
use crate::Error;

pub const DEFAULT_CACHE_CAPACITY: usize = 32;

/// Single cached value plus its timestamps.
#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    created_at: DateTime<Utc>,
    last_touched: DateTime<Utc>,
    /// Monotonic counter, breaks ties between equal `last_touched` values.
    touch_seq: u64,
}

struct Inner<K, V> {
    entries: HashMap<K, CacheEntry<V>>,
    next_seq: u64,
}

impl<K, V> Inner<K, V> {
    fn bump(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }
}

/// Size-bounded map with recency and age tracking.
///
/// * `len() <= capacity()` after every call.
/// * Inserting a new key while full evicts the entry with the oldest
///   last-touched timestamp. `get` counts as a touch; `peek` does not.
/// * Age for [`sweep_older_than`](Self::sweep_older_than) is measured from
///   creation, so touching an entry never postpones its sweep.
///
/// The whole structure sits behind one mutex; entry counts are small.
pub struct BoundedTimedCache<K, V> {
    inner: Mutex<Inner<K, V>>,
    max_size: usize,
    clock: Arc<dyn Clock>,
}

impl<K, V> BoundedTimedCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(max_size: usize, clock: Arc<dyn Clock>) -> Result<Self, Error> {
        if max_size == 0 {
            return Err(Error::Cache("cache capacity must be at least 1".into()));
        }
        Ok(Self {
            inner: Mutex::new(Inner {
                entries: HashMap::with_capacity(max_size),
                next_seq: 0,
            }),
            max_size,
            clock,
        })
    }

    pub fn capacity(&self) -> usize {
        self.max_size
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    /// Reads a value and refreshes its recency.
    pub fn get(&self, key: &K) -> Option<V> {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        let seq = inner.bump();
        let entry = inner.entries.get_mut(key)?;
        entry.last_touched = now;
        entry.touch_seq = seq;
        Some(entry.value.clone())
    }

    /// Reads a value without touching it.
    pub fn peek(&self, key: &K) -> Option<V> {
        self.inner.lock().entries.get(key).map(|e| e.value.clone())
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.inner.lock().entries.contains_key(key)
    }

    /// Inserts or overwrites. Returns the entry evicted to make room, if any.
    pub fn set(&self, key: K, value: V) -> Option<(K, V)> {
        let now = self.clock.now();
        self.insert_at(key, value, now)
    }

    /// Like [`set`](Self::set) but with an explicit creation time, for
    /// re-hydrating records that were created before a restart.
    pub fn restore(&self, key: K, value: V, created_at: DateTime<Utc>) -> Option<(K, V)> {
        self.insert_at(key, value, created_at)
    }

    fn insert_at(&self, key: K, value: V, created_at: DateTime<Utc>) -> Option<(K, V)> {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        let seq = inner.bump();

        let mut evicted = None;
        if !inner.entries.contains_key(&key) && inner.entries.len() >= self.max_size {
            let oldest = inner
                .entries
                .iter()
                .min_by_key(|(_, e)| (e.last_touched, e.touch_seq))
                .map(|(k, _)| k.clone());
            if let Some(old_key) = oldest {
                evicted = inner.entries.remove(&old_key).map(|e| (old_key, e.value));
            }
        }

        inner.entries.insert(
            key,
            CacheEntry {
                value,
                created_at,
                last_touched: now,
                touch_seq: seq,
            },
        );
        evicted
    }

    /// Idempotent; removing an absent key returns `None`.
    pub fn remove(&self, key: &K) -> Option<V> {
        self.inner.lock().entries.remove(key).map(|e| e.value)
    }

    /// Removes `key` only if `pred` holds for its current value.
    pub fn remove_if(&self, key: &K, pred: impl FnOnce(&V) -> bool) -> Option<V> {
        let mut inner = self.inner.lock();
        if !inner.entries.get(key).is_some_and(|e| pred(&e.value)) {
            return None;
        }
        inner.entries.remove(key).map(|e| e.value)
    }

    /// Every entry whose age (now - created_at) exceeds `max_age`, oldest
    /// first. Nothing is removed; the caller removes each entry once it has
    /// acted on it.
    pub fn sweep_older_than(&self, max_age: Duration) -> Vec<(K, V)> {
        let now = self.clock.now();
        let inner = self.inner.lock();
        let mut expired: Vec<(DateTime<Utc>, K, V)> = inner
            .entries
            .iter()
            .filter(|(_, e)| now - e.created_at > max_age)
            .map(|(k, e)| (e.created_at, k.clone(), e.value.clone()))
            .collect();
        expired.sort_by_key(|(created, _, _)| *created);
        expired.into_iter().map(|(_, k, v)| (k, v)).collect()
    }
}
