//! Run-scoped counters.
//!
//! One [`RunMetrics`] is owned per trainer and shared by reference with the
//! sampler and value estimator, so parallel trainers never mix counts.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::generation::CacheSnapshot;

#[derive(Debug, Default)]
pub struct RunMetrics {
    generation_calls: AtomicU64,
    generation_failures: AtomicU64,
    evaluation_fallbacks: AtomicU64,
    episodes_completed: AtomicU64,
    episodes_aborted: AtomicU64,
    /// Estimated tokens sent and received across every backend call.
    tokens_spent: AtomicU64,
}

impl RunMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_generation(&self, ok: bool) {
        self.generation_calls.fetch_add(1, Ordering::Relaxed);
        if !ok {
            self.generation_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Add `tokens` to the spend estimate.
    pub fn record_tokens(&self, tokens: usize) {
        self.tokens_spent.fetch_add(tokens as u64, Ordering::Relaxed);
    }

    pub fn tokens_spent(&self) -> u64 {
        self.tokens_spent.load(Ordering::Relaxed)
    }

    pub fn record_evaluation_fallback(&self) {
        self.evaluation_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_episode_completed(&self) {
        self.episodes_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_episode_aborted(&self) {
        self.episodes_aborted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self, cache: CacheSnapshot) -> MetricsSnapshot {
        MetricsSnapshot {
            generation_calls: self.generation_calls.load(Ordering::Relaxed),
            generation_failures: self.generation_failures.load(Ordering::Relaxed),
            evaluation_fallbacks: self.evaluation_fallbacks.load(Ordering::Relaxed),
            episodes_completed: self.episodes_completed.load(Ordering::Relaxed),
            episodes_aborted: self.episodes_aborted.load(Ordering::Relaxed),
            tokens_spent: self.tokens_spent(),
            cache_hits: cache.hits,
            cache_misses: cache.misses,
            cache_size: cache.size,
        }
    }
}

/// Serializable copy of the counters at one moment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub generation_calls: u64,
    pub generation_failures: u64,
    pub evaluation_fallbacks: u64,
    pub episodes_completed: u64,
    pub episodes_aborted: u64,
    #[serde(default)]
    pub tokens_spent: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_size: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::ResponseCache;

    #[test]
    fn test_counters_are_per_instance() {
        let a = RunMetrics::new();
        let b = RunMetrics::new();
        a.record_generation(true);
        a.record_generation(false);
        a.record_episode_aborted();
        a.record_tokens(12);
        a.record_tokens(30);
        let cache = ResponseCache::new(1);
        let snap_a = a.snapshot(cache.snapshot());
        let snap_b = b.snapshot(cache.snapshot());
        assert_eq!(snap_a.generation_calls, 2);
        assert_eq!(snap_a.generation_failures, 1);
        assert_eq!(snap_a.episodes_aborted, 1);
        assert_eq!(snap_a.tokens_spent, 42);
        assert_eq!(snap_b, MetricsSnapshot::default());
    }
}
