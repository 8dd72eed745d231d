//! Bounded LRU cache primitive
//!
//! Strict recency-based eviction, distinct from the age-based sweep in the
//! response cache: a `get` hit promotes the entry to most-recently-used,
//! and overflow evicts the least-recently-used entry.

use lru::LruCache;
use parking_lot::Mutex;
use std::hash::Hash;
use std::num::NonZeroUsize;

/// Thread-safe bounded LRU map.
pub struct LruMap<K: Hash + Eq, V: Clone> {
    inner: Mutex<LruCache<K, V>>,
}

impl<K: Hash + Eq, V: Clone> LruMap<K, V> {
    /// Create a map bounded to `capacity` entries (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Look up a key, promoting it to most-recently-used on a hit.
    pub fn get(&self, key: &K) -> Option<V> {
        self.inner.lock().get(key).cloned()
    }

    /// Insert or update a key as most-recently-used, evicting the
    /// least-recently-used entry on overflow.
    pub fn put(&self, key: K, value: V) {
        self.inner.lock().put(key, value);
    }

    /// Remove a key without touching recency of the rest.
    pub fn remove(&self, key: &K) -> Option<V> {
        self.inner.lock().pop(key)
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    pub fn cap(&self) -> usize {
        self.inner.lock().cap().get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_promotes_entry() {
        let map = LruMap::new(2);
        map.put("a", 1);
        map.put("b", 2);
        // Touch "a" so "b" becomes least-recently-used
        assert_eq!(map.get(&"a"), Some(1));
        map.put("c", 3);

        assert_eq!(map.get(&"b"), None);
        assert_eq!(map.get(&"a"), Some(1));
        assert_eq!(map.get(&"c"), Some(3));
    }

    #[test]
    fn test_overflow_evicts_least_recently_used() {
        let map = LruMap::new(2);
        map.put("a", 1);
        map.put("b", 2);
        map.put("c", 3);

        assert_eq!(map.len(), 2);
        assert_eq!(map.get(&"a"), None);
    }

    #[test]
    fn test_clear_and_capacity() {
        let map = LruMap::new(4);
        map.put(1u32, "x");
        map.put(2u32, "y");
        assert_eq!(map.len(), 2);

        map.clear();
        assert!(map.is_empty());
        assert_eq!(map.cap(), 4);
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let map = LruMap::new(0);
        map.put("a", 1);
        assert_eq!(map.get(&"a"), Some(1));
        assert_eq!(map.cap(), 1);
    }
}
