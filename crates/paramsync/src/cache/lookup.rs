//! Short-lived lookup cache with a declared TTL.

use std::hash::Hash;
use std::time::Duration;

use moka::sync::Cache;

/// TTL-bounded cache for remote lookups that are read repeatedly during a
/// run. Callers invalidate entries they mutate.
#[derive(Clone)]
pub struct LookupCache<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    inner: Cache<K, V>,
    ttl: Duration,
}

impl<K, V> LookupCache<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(ttl: Duration, max_capacity: u64) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(max_capacity)
                .time_to_live(ttl)
                .build(),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.inner.get(key)
    }

    pub fn insert(&self, key: K, value: V) {
        self.inner.insert(key, value);
    }

    pub fn invalidate(&self, key: &K) {
        self.inner.invalidate(key);
    }

    pub fn invalidate_all(&self) {
        self.inner.invalidate_all();
    }

    /// Returns the cached value or computes, stores and returns it. Errors
    /// are not cached.
    pub fn get_or_try_insert<E, F>(&self, key: K, load: F) -> Result<V, E>
    where
        F: FnOnce() -> Result<V, E>,
    {
        if let Some(value) = self.inner.get(&key) {
            return Ok(value);
        }
        let value = load()?;
        self.inner.insert(key, value.clone());
        Ok(value)
    }
}
