//! Bounded cache of scale factors keyed by quantized distance

use serde::Serialize;
use std::collections::HashMap;
use tracing::trace;

/// Cache counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

/// Scale factors keyed by `floor(distance / bucket_size)`
///
/// When full, roughly a quarter of the entries are dropped in whatever
/// order the map yields them, not least recently used first.
#[derive(Debug)]
pub struct ScaleCache {
    entries: HashMap<i64, f64>,
    max_entries: usize,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl ScaleCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: HashMap::with_capacity(max_entries.min(4096)),
            max_entries: max_entries.max(1),
            hits: 0,
            misses: 0,
            evictions: 0,
        }
    }

    /// Quantize a distance into its bucket key
    pub fn key(distance: f64, bucket_size: f64) -> i64 {
        // `as` saturates, so absurd distances share the last bucket
        (distance / bucket_size).floor() as i64
    }

    /// Representative distance of a bucket: its midpoint, never below 1
    pub fn bucket_distance(key: i64, bucket_size: f64) -> f64 {
        ((key as f64 + 0.5) * bucket_size).max(1.0)
    }

    pub fn get(&mut self, key: i64) -> Option<f64> {
        match self.entries.get(&key) {
            Some(value) => {
                self.hits += 1;
                Some(*value)
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    pub fn insert(&mut self, key: i64, value: f64) {
        if self.entries.len() >= self.max_entries && !self.entries.contains_key(&key) {
            self.evict_quarter();
        }
        self.entries.insert(key, value);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            hits: self.hits,
            misses: self.misses,
            evictions: self.evictions,
        }
    }

    fn evict_quarter(&mut self) {
        let count = (self.entries.len() / 4).max(1);
        let victims: Vec<i64> = self.entries.keys().take(count).copied().collect();
        for key in &victims {
            self.entries.remove(key);
        }
        self.evictions += victims.len() as u64;
        trace!(evicted = victims.len(), remaining = self.entries.len(), "Scale cache eviction");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantization() {
        assert_eq!(ScaleCache::key(99.9, 10.0), 9);
        assert_eq!(ScaleCache::key(100.0, 10.0), 10);
        assert_eq!(ScaleCache::bucket_distance(9, 10.0), 95.0);
        assert_eq!(ScaleCache::bucket_distance(0, 0.5), 1.0);
        assert_eq!(ScaleCache::key(f64::MAX, 1.0), i64::MAX);
    }

    #[test]
    fn test_hits_and_misses() {
        let mut cache = ScaleCache::new(8);
        assert_eq!(cache.get(3), None);
        cache.insert(3, 0.25);
        assert_eq!(cache.get(3), Some(0.25));

        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.entries), (1, 1, 1));
    }

    #[test]
    fn test_eviction_keeps_size_bounded() {
        let mut cache = ScaleCache::new(100);
        for key in 0..1_000 {
            cache.insert(key, key as f64);
            assert!(cache.len() <= 100);
        }
        // Each eviction round removes a quarter of a full cache
        assert!(cache.stats().evictions >= 25);
        assert!(cache.len() > 75);
    }
}
