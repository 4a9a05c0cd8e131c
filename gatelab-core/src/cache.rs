//! Per-run feature cache — bounded, LRU-evicted, collision-resistant keys.
//!
//! The key is the full triple (bar index, window content hash, config
//! hash). The config hash is mandatory: two concurrent trials with
//! different configurations must never share an entry, and the runner
//! enforces this structurally by giving each run its own cache instance on
//! top of the keying. Never key by a coarse proxy of the window.

use std::collections::HashMap;

use crate::domain::{ConfigHash, WindowHash};
use crate::features::FeatureVector;

/// Cache key: bar identity + window content + configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub bar_index: usize,
    pub window_hash: WindowHash,
    pub config_hash: ConfigHash,
}

#[derive(Debug, Clone)]
struct Entry {
    value: FeatureVector,
    last_used: u64,
}

/// Bounded LRU cache for feature vectors, scoped to a single replay run.
#[derive(Debug)]
pub struct FeatureCache {
    capacity: usize,
    map: HashMap<CacheKey, Entry>,
    tick: u64,
    hits: u64,
    misses: u64,
}

impl FeatureCache {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity >= 1, "cache capacity must be >= 1");
        Self {
            capacity,
            map: HashMap::with_capacity(capacity.min(4096)),
            tick: 0,
            hits: 0,
            misses: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }

    pub fn get(&mut self, key: &CacheKey) -> Option<FeatureVector> {
        self.tick += 1;
        let tick = self.tick;
        match self.map.get_mut(key) {
            Some(entry) => {
                entry.last_used = tick;
                self.hits += 1;
                Some(entry.value.clone())
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    pub fn put(&mut self, key: CacheKey, value: FeatureVector) {
        self.tick += 1;
        if self.map.len() >= self.capacity && !self.map.contains_key(&key) {
            self.evict_lru();
        }
        self.map.insert(
            key,
            Entry {
                value,
                last_used: self.tick,
            },
        );
    }

    fn evict_lru(&mut self) {
        if let Some(key) = self
            .map
            .iter()
            .min_by_key(|(_, e)| e.last_used)
            .map(|(k, _)| k.clone())
        {
            self.map.remove(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::names;

    fn key(bar: usize, window: &str, config: &str) -> CacheKey {
        CacheKey {
            bar_index: bar,
            window_hash: WindowHash(window.into()),
            config_hash: ConfigHash(config.into()),
        }
    }

    fn vector(close: f64) -> FeatureVector {
        let mut fv = FeatureVector::new();
        fv.insert(names::CLOSE, close);
        fv
    }

    #[test]
    fn put_then_get() {
        let mut cache = FeatureCache::new(4);
        cache.put(key(0, "w0", "c0"), vector(100.0));
        let got = cache.get(&key(0, "w0", "c0")).unwrap();
        assert_eq!(got.get(names::CLOSE), Some(100.0));
        assert_eq!(cache.hits(), 1);
    }

    #[test]
    fn distinct_configs_never_share_entries() {
        let mut cache = FeatureCache::new(4);
        cache.put(key(0, "w0", "config_a"), vector(100.0));
        assert!(cache.get(&key(0, "w0", "config_b")).is_none());
        assert_eq!(cache.misses(), 1);
    }

    #[test]
    fn distinct_windows_never_share_entries() {
        let mut cache = FeatureCache::new(4);
        cache.put(key(5, "window_a", "c0"), vector(100.0));
        assert!(cache.get(&key(5, "window_b", "c0")).is_none());
    }

    #[test]
    fn evicts_least_recently_used() {
        let mut cache = FeatureCache::new(2);
        cache.put(key(0, "w", "c"), vector(0.0));
        cache.put(key(1, "w", "c"), vector(1.0));
        // Touch key 0 so key 1 becomes the LRU entry.
        cache.get(&key(0, "w", "c"));
        cache.put(key(2, "w", "c"), vector(2.0));

        assert!(cache.get(&key(0, "w", "c")).is_some());
        assert!(cache.get(&key(1, "w", "c")).is_none());
        assert!(cache.get(&key(2, "w", "c")).is_some());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn capacity_is_bounded() {
        let mut cache = FeatureCache::new(8);
        for i in 0..100 {
            cache.put(key(i, "w", "c"), vector(i as f64));
        }
        assert_eq!(cache.len(), 8);
    }

    #[test]
    fn overwriting_existing_key_does_not_evict() {
        let mut cache = FeatureCache::new(2);
        cache.put(key(0, "w", "c"), vector(0.0));
        cache.put(key(1, "w", "c"), vector(1.0));
        cache.put(key(1, "w", "c"), vector(1.5));
        assert_eq!(cache.len(), 2);
        assert!(cache.get(&key(0, "w", "c")).is_some());
        assert_eq!(
            cache.get(&key(1, "w", "c")).unwrap().get(names::CLOSE),
            Some(1.5)
        );
    }
}
