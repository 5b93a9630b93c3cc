use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use lru::LruCache;
use sha2::{Digest, Sha256};

/// Keyed by `sha256(text | model_id)`, 5 minute TTL, 1000 entries.
const DEFAULT_CAPACITY: usize = 1000;
const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

struct Entry {
    vector: Vec<f32>,
    cached_at: Instant,
}

/// In-process LRU cache for embedding vectors, scoped to one
/// [`crate::EmbeddingService`]. Stale entries are evicted lazily on lookup
/// rather than by a background sweep.
pub struct EmbeddingCache {
    entries: Mutex<LruCache<String, Entry>>,
    ttl: Duration,
}

impl EmbeddingCache {
    pub fn new() -> Self {
        Self::with_capacity_and_ttl(DEFAULT_CAPACITY, DEFAULT_TTL)
    }

    pub fn with_capacity_and_ttl(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }

    pub fn key(text: &str, model_id: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        hasher.update(b"|");
        hasher.update(model_id.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    pub fn get(&self, key: &str) -> Option<Vec<f32>> {
        let mut guard = self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        match guard.get(key) {
            Some(entry) if entry.cached_at.elapsed() < self.ttl => Some(entry.vector.clone()),
            Some(_) => {
                guard.pop(key);
                None
            }
            None => None,
        }
    }

    pub fn put(&self, key: String, vector: Vec<f32>) {
        let mut guard = self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.put(
            key,
            Entry {
                vector,
                cached_at: Instant::now(),
            },
        );
    }
}

impl Default for EmbeddingCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_stable_and_scoped_by_model() {
        let a = EmbeddingCache::key("hello", "model-a");
        let b = EmbeddingCache::key("hello", "model-a");
        let c = EmbeddingCache::key("hello", "model-b");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn hit_then_evict_on_ttl_expiry() {
        let cache = EmbeddingCache::with_capacity_and_ttl(10, Duration::from_millis(20));
        let key = EmbeddingCache::key("hello", "model-a");
        cache.put(key.clone(), vec![1.0, 2.0]);
        assert_eq!(cache.get(&key), Some(vec![1.0, 2.0]));
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(cache.get(&key), None);
    }

    #[test]
    fn capacity_evicts_least_recently_used() {
        let cache = EmbeddingCache::with_capacity_and_ttl(2, Duration::from_secs(60));
        cache.put("a".into(), vec![1.0]);
        cache.put("b".into(), vec![2.0]);
        cache.put("c".into(), vec![3.0]);
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.get("b"), Some(vec![2.0]));
        assert_eq!(cache.get("c"), Some(vec![3.0]));
    }
}
