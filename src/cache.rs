use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Thread-safe bounded cache with per-entry TTL and LRU eviction.
///
/// `get` treats an expired entry as absent and evicts it on the spot; a
/// live read refreshes the entry's recency. `set` evicts the least
/// recently used entries once the map exceeds capacity.
#[derive(Debug)]
pub struct TtlCache<K, V> {
    inner: Mutex<CacheInner<K, V>>,
    capacity: usize,
    ttl: Duration,
}

#[derive(Debug)]
struct CacheInner<K, V> {
    map: HashMap<K, CacheEntry<V>>,
    // Monotonically increasing read/write counter used as the recency stamp.
    tick: u64,
}

#[derive(Debug)]
struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
    last_used: u64,
}

impl<K: Eq + Hash + Clone, V: Clone> TtlCache<K, V> {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                map: HashMap::new(),
                tick: 0,
            }),
            capacity,
            ttl,
        }
    }

    /// Look up a key, returning `None` for missing or expired entries.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let expired = match inner.map.get(key) {
            None => return None,
            Some(entry) => Instant::now() > entry.expires_at,
        };
        if expired {
            inner.map.remove(key);
            return None;
        }
        inner.tick += 1;
        let tick = inner.tick;
        if let Some(entry) = inner.map.get_mut(key) {
            entry.last_used = tick;
            return Some(entry.value.clone());
        }
        None
    }

    /// Insert or refresh an entry, evicting LRU entries past capacity.
    pub fn set(&self, key: K, value: V) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.tick += 1;
        let tick = inner.tick;
        let expires_at = Instant::now() + self.ttl;
        inner.map.insert(
            key,
            CacheEntry {
                value,
                expires_at,
                last_used: tick,
            },
        );
        while inner.map.len() > self.capacity {
            let oldest = inner
                .map
                .iter()
                .min_by_key(|(_, entry)| entry.last_used)
                .map(|(key, _)| key.clone());
            match oldest {
                Some(key) => inner.map.remove(&key),
                None => break,
            };
        }
    }

    pub fn contains(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.map.clear();
    }
}

/// Anything the registry can clear on demand.
pub trait ClearableCache: Send + Sync {
    fn clear_cache(&self);
}

impl<K: Eq + Hash + Clone + Send + Sync, V: Clone + Send + Sync> ClearableCache for TtlCache<K, V> {
    fn clear_cache(&self) {
        self.clear();
    }
}

/// Explicit registry of named caches, owned by the composition root.
///
/// Replaces a process-global cache map: callers register the caches they
/// create and can clear one by name or all at once.
#[derive(Default)]
pub struct CacheRegistry {
    caches: Mutex<HashMap<String, Arc<dyn ClearableCache>>>,
}

impl CacheRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, name: impl Into<String>, cache: Arc<dyn ClearableCache>) {
        let mut caches = self.caches.lock().unwrap_or_else(|e| e.into_inner());
        caches.insert(name.into(), cache);
    }

    /// Clear one cache by name; returns false if no such cache exists.
    pub fn clear(&self, name: &str) -> bool {
        let caches = self.caches.lock().unwrap_or_else(|e| e.into_inner());
        match caches.get(name) {
            Some(cache) => {
                cache.clear_cache();
                true
            }
            None => false,
        }
    }

    pub fn clear_all(&self) {
        let caches = self.caches.lock().unwrap_or_else(|e| e.into_inner());
        for cache in caches.values() {
            cache.clear_cache();
        }
    }
}
