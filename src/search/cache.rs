//! TTL-backed LRU caches for query results and embeddings, mirroring the
//! teacher's `retrieval::cache` split between an LRU map and a thin TTL
//! wrapper around it. Invalidation is lazy: expired entries are dropped on
//! next lookup rather than swept proactively.

use lru::LruCache;
use parking_lot::Mutex;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use crate::element::Vector;
use crate::vector::ScoredHit;

struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

/// Fixed-capacity LRU keyed by a query signature, with per-entry TTL.
pub struct ResultCache {
    inner: Mutex<LruCache<u64, CacheEntry<Vec<ScoredHit>>>>,
    ttl: Duration,
}

impl ResultCache {
    #[must_use]
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity.max(1)).expect("capacity clamped to >= 1"),
            )),
            ttl,
        }
    }

    #[must_use]
    pub fn signature(query: &[f32], k: usize, filter_key: &str) -> u64 {
        let mut hasher = DefaultHasher::new();
        for component in query {
            component.to_bits().hash(&mut hasher);
        }
        k.hash(&mut hasher);
        filter_key.hash(&mut hasher);
        hasher.finish()
    }

    #[must_use]
    pub fn get(&self, key: u64) -> Option<Vec<ScoredHit>> {
        let mut inner = self.inner.lock();
        match inner.get(&key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.value.clone()),
            Some(_) => {
                inner.pop(&key);
                None
            }
            None => None,
        }
    }

    pub fn put(&self, key: u64, value: Vec<ScoredHit>) {
        self.inner.lock().put(
            key,
            CacheEntry {
                value,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    /// Drops every cached entry. Used whenever the underlying index mutates,
    /// since a stale hit list is worse than a cache miss.
    pub fn invalidate_all(&self) {
        self.inner.lock().clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Fixed-capacity LRU of `text -> embedding`, with per-entry TTL.
pub struct EmbeddingCache {
    inner: Mutex<LruCache<u64, CacheEntry<Vector>>>,
    ttl: Duration,
}

impl EmbeddingCache {
    #[must_use]
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity.max(1)).expect("capacity clamped to >= 1"),
            )),
            ttl,
        }
    }

    fn key_for(text: &str) -> u64 {
        let mut hasher = DefaultHasher::new();
        text.hash(&mut hasher);
        hasher.finish()
    }

    #[must_use]
    pub fn get(&self, text: &str) -> Option<Vector> {
        let key = Self::key_for(text);
        let mut inner = self.inner.lock();
        match inner.get(&key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.value.clone()),
            Some(_) => {
                inner.pop(&key);
                None
            }
            None => None,
        }
    }

    pub fn put(&self, text: &str, vector: Vector) {
        let key = Self::key_for(text);
        self.inner.lock().put(
            key,
            CacheEntry {
                value: vector,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    pub fn invalidate_all(&self) {
        self.inner.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_cache_hits_then_misses_after_invalidate() {
        let cache = ResultCache::new(10, Duration::from_secs(60));
        let key = ResultCache::signature(&[1.0, 0.0], 5, "");
        cache.put(
            key,
            vec![ScoredHit {
                id: "a".into(),
                score: 0.9,
            }],
        );
        assert!(cache.get(key).is_some());
        cache.invalidate_all();
        assert!(cache.get(key).is_none());
    }

    #[test]
    fn result_cache_entry_expires_after_ttl() {
        let cache = ResultCache::new(10, Duration::from_millis(1));
        let key = ResultCache::signature(&[1.0], 1, "");
        cache.put(key, vec![]);
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get(key).is_none());
    }

    #[test]
    fn embedding_cache_round_trips() {
        let cache = EmbeddingCache::new(10, Duration::from_secs(60));
        cache.put("hello", vec![1.0, 2.0, 3.0]);
        assert_eq!(cache.get("hello"), Some(vec![1.0, 2.0, 3.0]));
        assert_eq!(cache.get("other"), None);
    }
}
