//! `src/cache/cache_manager.rs`
//! ============================================================================
//! # Path-keyed caches for listings and previews
//!
//! The navigator owns exactly one writer for each cache, so the map itself is a
//! plain `HashMap`. There is no eviction policy: an entry lives until it is
//! replaced by a newer load, pruned because caching was disabled, or dropped by
//! an explicit reload.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::atomic::{AtomicU64, Ordering},
};

use tracing::debug;

/// Cache statistics for monitoring and debugging
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    inserts: AtomicU64,
    replacements: AtomicU64,
    clears: AtomicU64,
}

impl CacheStats {
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    fn record_insert(&self, replaced: bool) {
        self.inserts.fetch_add(1, Ordering::Relaxed);
        if replaced {
            self.replacements.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn record_clear(&self) {
        self.clears.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            inserts: self.inserts.load(Ordering::Relaxed),
            replacements: self.replacements.load(Ordering::Relaxed),
            clears: self.clears.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub inserts: u64,
    pub replacements: u64,
    pub clears: u64,
}

impl CacheStatsSnapshot {
    #[expect(clippy::cast_precision_loss, reason = "ratio only")]
    pub fn hit_rate(&self) -> f64 {
        let total: u64 = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Unbounded map from absolute path to a cached value.
#[derive(Debug)]
pub struct PathCache<T> {
    name: &'static str,
    entries: HashMap<PathBuf, T>,
    stats: CacheStats,
}

impl<T> PathCache<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            entries: HashMap::new(),
            stats: CacheStats::default(),
        }
    }

    /// Lookup that counts towards the hit/miss statistics.
    pub fn lookup(&mut self, path: &Path) -> Option<&mut T> {
        match self.entries.get_mut(path) {
            Some(v) => {
                self.stats.record_hit();
                Some(v)
            }
            None => {
                self.stats.record_miss();
                None
            }
        }
    }

    pub fn get(&self, path: &Path) -> Option<&T> {
        self.entries.get(path)
    }

    pub fn get_mut(&mut self, path: &Path) -> Option<&mut T> {
        self.entries.get_mut(path)
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.entries.contains_key(path)
    }

    /// Insert or replace, returning the previous value.
    pub fn insert(&mut self, path: PathBuf, value: T) -> Option<T> {
        let prev: Option<T> = self.entries.insert(path, value);
        self.stats.record_insert(prev.is_some());
        prev
    }

    pub fn remove(&mut self, path: &Path) -> Option<T> {
        self.entries.remove(path)
    }

    pub fn retain(&mut self, keep: impl FnMut(&PathBuf, &mut T) -> bool) {
        self.entries.retain(keep);
    }

    pub fn clear(&mut self) {
        debug!(
            marker = "CACHE_CLEAR",
            operation_type = "cache_clear",
            cache = self.name,
            entries = self.entries.len(),
            "Clearing cache"
        );
        self.entries.clear();
        self.stats.record_clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        self.stats.snapshot()
    }
}
