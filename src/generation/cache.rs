//! Content-addressed memo of generation requests.
//!
//! Keys hash `(agent id, context, temperature, k)`; values are the ordered
//! response batch. Eviction is insertion-ordered: once full, the oldest
//! inserted key goes first, regardless of how recently it was read.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use indexmap::IndexMap;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::debug;

/// Stable, order-sensitive key over all four request inputs.
///
/// Each field is length-prefixed so no two distinct tuples share a byte
/// stream. Temperature is hashed by bit pattern.
pub fn cache_key(agent_id: usize, context: &str, temperature: f64, k: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update((agent_id as u64).to_le_bytes());
    hasher.update((context.len() as u64).to_le_bytes());
    hasher.update(context.as_bytes());
    hasher.update(temperature.to_bits().to_le_bytes());
    hasher.update((k as u64).to_le_bytes());
    hex::encode(hasher.finalize())
}

/// Hit/miss counters. Observability only.
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
}

/// Point-in-time copy of [`CacheStats`] plus occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub size: usize,
    pub capacity: usize,
}

/// FIFO-evicting response cache, safe to share across concurrent sample calls.
#[derive(Debug)]
pub struct ResponseCache {
    capacity: usize,
    entries: Mutex<IndexMap<String, Vec<String>>>,
    stats: CacheStats,
}

impl ResponseCache {
    /// `capacity` is clamped to at least one entry.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: Mutex::new(IndexMap::new()),
            stats: CacheStats::default(),
        }
    }

    pub fn get(
        &self,
        agent_id: usize,
        context: &str,
        temperature: f64,
        k: usize,
    ) -> Option<Vec<String>> {
        let key = cache_key(agent_id, context, temperature, k);
        let found = self
            .entries
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(&key)
            .cloned();
        match found {
            Some(responses) => {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                debug!(agent_id, key = &key[..12], "cache hit");
                Some(responses)
            }
            None => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store a batch. Re-putting an existing key replaces its value and keeps
    /// its original insertion position.
    pub fn put(
        &self,
        agent_id: usize,
        context: &str,
        temperature: f64,
        k: usize,
        responses: Vec<String>,
    ) {
        let key = cache_key(agent_id, context, temperature, k);
        let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(existing) = entries.get_mut(&key) {
            *existing = responses;
            return;
        }
        if entries.len() >= self.capacity {
            if let Some((evicted, _)) = entries.shift_remove_index(0) {
                debug!(key = &evicted[..12], "cache evicted oldest entry");
            }
        }
        entries.insert(key, responses);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn snapshot(&self) -> CacheSnapshot {
        CacheSnapshot {
            hits: self.stats.hits.load(Ordering::Relaxed),
            misses: self.stats.misses.load(Ordering::Relaxed),
            size: self.len(),
            capacity: self.capacity,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn batch(tag: &str) -> Vec<String> {
        vec![format!("{tag}-0"), format!("{tag}-1")]
    }

    #[test]
    fn test_put_then_get_returns_exact_list() {
        let cache = ResponseCache::new(4);
        cache.put(1, "ctx", 0.7, 2, batch("a"));
        assert_eq!(cache.get(1, "ctx", 0.7, 2), Some(batch("a")));
    }

    #[test]
    fn test_distinct_parameters_do_not_collide() {
        let cache = ResponseCache::new(8);
        cache.put(1, "ctx", 0.7, 2, batch("a"));
        assert_eq!(cache.get(2, "ctx", 0.7, 2), None);
        assert_eq!(cache.get(1, "ctx2", 0.7, 2), None);
        assert_eq!(cache.get(1, "ctx", 0.8, 2), None);
        assert_eq!(cache.get(1, "ctx", 0.7, 3), None);
    }

    #[test]
    fn test_key_is_length_prefixed() {
        assert_ne!(cache_key(1, "ab", 0.5, 1), cache_key(1, "a", 0.5, 1));
        assert_eq!(cache_key(1, "ab", 0.5, 1), cache_key(1, "ab", 0.5, 1));
    }

    #[test]
    fn test_fifo_eviction_of_first_inserted() {
        let cache = ResponseCache::new(3);
        for i in 0..4 {
            cache.put(i, "ctx", 0.7, 1, batch(&i.to_string()));
        }
        assert_eq!(cache.len(), 3);
        assert_eq!(cache.get(0, "ctx", 0.7, 1), None);
        assert!(cache.get(3, "ctx", 0.7, 1).is_some());
    }

    #[test]
    fn test_reads_do_not_refresh_position() {
        let cache = ResponseCache::new(2);
        cache.put(0, "ctx", 0.7, 1, batch("0"));
        cache.put(1, "ctx", 0.7, 1, batch("1"));
        // A read would save key 0 under LRU; FIFO still evicts it.
        assert!(cache.get(0, "ctx", 0.7, 1).is_some());
        cache.put(2, "ctx", 0.7, 1, batch("2"));
        assert_eq!(cache.get(0, "ctx", 0.7, 1), None);
        assert!(cache.get(1, "ctx", 0.7, 1).is_some());
    }

    #[test]
    fn test_reput_keeps_position_and_updates_value() {
        let cache = ResponseCache::new(2);
        cache.put(0, "ctx", 0.7, 1, batch("old"));
        cache.put(1, "ctx", 0.7, 1, batch("1"));
        cache.put(0, "ctx", 0.7, 1, batch("new"));
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(0, "ctx", 0.7, 1), Some(batch("new")));
        cache.put(2, "ctx", 0.7, 1, batch("2"));
        assert_eq!(cache.get(0, "ctx", 0.7, 1), None);
    }

    #[test]
    fn test_stats_count_hits_and_misses() {
        let cache = ResponseCache::new(2);
        cache.get(0, "ctx", 0.7, 1);
        cache.put(0, "ctx", 0.7, 1, batch("0"));
        cache.get(0, "ctx", 0.7, 1);
        cache.get(0, "ctx", 0.7, 1);
        let snap = cache.snapshot();
        assert_eq!(snap.hits, 2);
        assert_eq!(snap.misses, 1);
        assert_eq!(snap.size, 1);
    }

    #[test]
    fn test_concurrent_puts_respect_capacity() {
        let cache = Arc::new(ResponseCache::new(16));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    for i in 0..50 {
                        cache.put(t * 100 + i, "ctx", 0.7, 1, batch("x"));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(cache.len(), 16);
    }
}
