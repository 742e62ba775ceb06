//! Memoization of selection results.
//!
//! One mutex guards the LRU map, so an entry's value and timestamp are always
//! read together and eviction happens in the same critical section as the
//! insert. Expiry is checked on read; there is no background sweeper.

use lru::LruCache;
use serde::Serialize;
use std::collections::BTreeSet;
use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::debug;

use crate::config::CacheConfig;
use crate::types::{DifficultyBand, ExampleOrder, ExampleSet, RatingInterval, SelectionRequest};

/// Full filter tuple of a selection request
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub theme: String,
    pub difficulty: DifficultyBand,
    pub interval: RatingInterval,
    pub excluded_themes: BTreeSet<String>,
    pub desired_count: usize,
    pub min_popularity: Option<i32>,
    pub order: ExampleOrder,
}

impl CacheKey {
    pub fn new(request: &SelectionRequest, interval: RatingInterval) -> Self {
        Self {
            theme: request.theme.clone(),
            difficulty: request.difficulty,
            interval,
            excluded_themes: request.excluded_themes.clone(),
            desired_count: request.desired_count,
            min_popularity: request.min_popularity,
            order: request.order,
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: ExampleSet,
    created_at: Instant,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub expired: u64,
    pub evictions: u64,
    pub size: usize,
    pub capacity: usize,
}

struct Inner {
    entries: LruCache<CacheKey, CacheEntry>,
    stats: CacheStats,
}

pub struct SelectionCache {
    inner: Mutex<Inner>,
    ttl: Duration,
}

impl SelectionCache {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(Inner {
                entries: LruCache::new(capacity),
                stats: CacheStats {
                    capacity: capacity.get(),
                    ..Default::default()
                },
            }),
            ttl,
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.ttl(), config.capacity)
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // cached values are plain data, a poisoned guard is still consistent
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn get(&self, key: &CacheKey) -> Option<ExampleSet> {
        self.get_at(key, Instant::now())
    }

    pub(crate) fn get_at(&self, key: &CacheKey, now: Instant) -> Option<ExampleSet> {
        let mut inner = self.lock();
        let Some(created_at) = inner.entries.get(key).map(|entry| entry.created_at) else {
            inner.stats.misses += 1;
            return None;
        };

        if now.saturating_duration_since(created_at) >= self.ttl {
            inner.entries.pop(key);
            inner.stats.expired += 1;
            inner.stats.misses += 1;
            inner.stats.size = inner.entries.len();
            debug!(theme = %key.theme, "Cache entry expired");
            return None;
        }

        inner.stats.hits += 1;
        inner.entries.get(key).map(|entry| entry.value.clone())
    }

    pub fn put(&self, key: CacheKey, value: ExampleSet) {
        self.put_at(key, value, Instant::now())
    }

    pub(crate) fn put_at(&self, key: CacheKey, value: ExampleSet, now: Instant) {
        let mut inner = self.lock();
        let entry = CacheEntry {
            value,
            created_at: now,
        };
        if let Some((evicted, _)) = inner.entries.push(key.clone(), entry) {
            if evicted != key {
                inner.stats.evictions += 1;
                debug!(theme = %evicted.theme, "Cache evicted least recently used entry");
            }
        }
        inner.stats.size = inner.entries.len();
    }

    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.entries.clear();
        inner.stats.size = 0;
    }

    pub fn stats(&self) -> CacheStats {
        self.lock().stats.clone()
    }
}
