//! Generic per-process TTL cache (§4.4): hot lookups for credentials, LLM
//! configs, and persona/cascade resolution. TTL is a safety net orthogonal
//! to pub/sub freshness — entries are also evicted eagerly by
//! `InvalidationBus` subscribers.
//!
//! Grounded on the gateway's `CachedUserFacts`/`CachedToolDefs` TTL-cache
//! fields on `AppState`, generalized into a reusable keyed store.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

struct Entry<V> {
    value: V,
    inserted_at: Instant,
}

pub struct TtlCache<K, V> {
    entries: RwLock<HashMap<K, Entry<V>>>,
    ttl: Duration,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let entries = self.entries.read();
        let entry = entries.get(key)?;
        if entry.inserted_at.elapsed() < self.ttl {
            Some(entry.value.clone())
        } else {
            None
        }
    }

    pub fn insert(&self, key: K, value: V) {
        self.entries.write().insert(
            key,
            Entry {
                value,
                inserted_at: Instant::now(),
            },
        );
    }

    /// `invalidateUser`/`invalidateEntity` consumer mutation: evict one key.
    pub fn invalidate(&self, key: &K) {
        self.entries.write().remove(key);
    }

    /// `clearAll` consumer mutation.
    pub fn clear_all(&self) {
        self.entries.write().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expires_after_ttl() {
        let cache: TtlCache<&'static str, i32> = TtlCache::new(Duration::from_millis(10));
        cache.insert("a", 1);
        assert_eq!(cache.get(&"a"), Some(1));
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(cache.get(&"a"), None);
    }

    #[test]
    fn invalidate_removes_single_key() {
        let cache: TtlCache<&'static str, i32> = TtlCache::new(Duration::from_secs(60));
        cache.insert("a", 1);
        cache.insert("b", 2);
        cache.invalidate(&"a");
        assert_eq!(cache.get(&"a"), None);
        assert_eq!(cache.get(&"b"), Some(2));
    }

    #[test]
    fn clear_all_empties_cache() {
        let cache: TtlCache<&'static str, i32> = TtlCache::new(Duration::from_secs(60));
        cache.insert("a", 1);
        cache.insert("b", 2);
        cache.clear_all();
        assert!(cache.is_empty());
    }
}
