//! Permission caching with TTL expiry
//!
//! Thread-safe cache mapping user id to the permission set fetched from the
//! auth service. Entries expire after their TTL and are evicted on access;
//! an expired entry behaves exactly like absence. Sharded locking via
//! `DashMap` keeps reads concurrent and writes to one key independent of
//! unrelated keys.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;

/// Thread-safe permission cache with TTL expiry
pub struct PermissionCache {
    /// Entries keyed by user id
    entries: DashMap<String, CacheEntry>,
    /// Cache statistics
    stats: CacheStats,
}

/// A cached permission set with TTL metadata
struct CacheEntry {
    /// Permission strings for the user
    permissions: HashSet<String>,
    /// When this entry was stored
    fetched_at: Instant,
    /// Time-to-live duration
    ttl: Duration,
}

impl CacheEntry {
    /// Check if this entry has expired
    fn is_expired(&self) -> bool {
        self.fetched_at.elapsed() > self.ttl
    }
}

/// Cache statistics tracked atomically
#[derive(Debug)]
pub struct CacheStats {
    /// Total cache hits
    pub hits: AtomicU64,
    /// Total cache misses (not found or expired)
    pub misses: AtomicU64,
    /// Total evictions (expired entries removed)
    pub evictions: AtomicU64,
}

impl CacheStats {
    fn new() -> Self {
        Self {
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }
}

/// Snapshot of cache statistics
#[derive(Debug, Clone, serde::Serialize)]
pub struct CacheStatsSnapshot {
    /// Total cache hits
    pub hits: u64,
    /// Total cache misses
    pub misses: u64,
    /// Total evictions
    pub evictions: u64,
    /// Current number of entries
    pub size: usize,
    /// Hit rate (0.0-1.0)
    pub hit_rate: f64,
}

impl PermissionCache {
    /// Create a new empty cache
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            stats: CacheStats::new(),
        }
    }

    /// Get the cached permission set for a user if present and not expired.
    ///
    /// Expired entries are evicted and reported as a miss; the caller is
    /// responsible for fetching fresh data and calling [`put`](Self::put).
    pub fn get(&self, user_id: &str) -> Option<HashSet<String>> {
        if let Some(entry) = self.entries.get(user_id) {
            if entry.is_expired() {
                drop(entry);
                self.entries.remove(user_id);
                self.stats.evictions.fetch_add(1, Ordering::Relaxed);
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                None
            } else {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.permissions.clone())
            }
        } else {
            self.stats.misses.fetch_add(1, Ordering::Relaxed);
            None
        }
    }

    /// Store a permission set for a user with the given TTL
    pub fn put(&self, user_id: &str, permissions: HashSet<String>, ttl: Duration) {
        self.entries.insert(
            user_id.to_string(),
            CacheEntry {
                permissions,
                fetched_at: Instant::now(),
                ttl,
            },
        );
    }

    /// Remove the entry for a user, if any
    pub fn invalidate(&self, user_id: &str) {
        self.entries.remove(user_id);
    }

    /// Remove all entries
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Get a snapshot of cache statistics
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn stats(&self) -> CacheStatsSnapshot {
        let hits = self.stats.hits.load(Ordering::Relaxed);
        let misses = self.stats.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        CacheStatsSnapshot {
            hits,
            misses,
            evictions: self.stats.evictions.load(Ordering::Relaxed),
            size: self.entries.len(),
            hit_rate: if total == 0 {
                0.0
            } else {
                hits as f64 / total as f64
            },
        }
    }
}

impl Default for PermissionCache {
    fn default() -> Self {
        Self::new()
    }
}
