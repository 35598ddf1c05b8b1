//! Response Cache
//!
//! Bounded, TTL-aware cache of decoded data API responses keyed by endpoint.
//!
//! Entries expire lazily: an expired entry is dropped when it is next read.
//! When the cache is full, inserting a new key evicts the least recently
//! used entry.

use lru::LruCache;
use serde_json::Value;
use std::num::NonZeroUsize;
use std::time::Duration;
use tokio::time::Instant;

/// A cached payload and its expiry.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub payload: Value,
    /// `None` when the TTL reaches past what the clock can represent.
    pub expires_at: Option<Instant>,
}

impl CacheEntry {
    fn is_fresh(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| now < at)
    }
}

/// Cache statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub entries: usize,
}

/// LRU cache with per-entry TTL.
pub struct ResponseCache {
    entries: LruCache<String, CacheEntry>,
    stats: CacheStats,
}

impl ResponseCache {
    /// Create a cache holding at most `capacity` entries (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: LruCache::new(capacity),
            stats: CacheStats::default(),
        }
    }

    /// Fresh payload for `key`, if any.
    pub fn get(&mut self, key: &str) -> Option<Value> {
        self.get_at(key, Instant::now())
    }

    /// Fresh payload for `key` without touching the counters or the LRU order.
    pub fn peek_fresh(&self, key: &str) -> Option<Value> {
        let now = Instant::now();
        self.entries
            .peek(key)
            .filter(|entry| entry.is_fresh(now))
            .map(|entry| entry.payload.clone())
    }

    fn get_at(&mut self, key: &str, now: Instant) -> Option<Value> {
        let fresh = self.entries.peek(key).map(|entry| entry.is_fresh(now));

        match fresh {
            Some(true) => {
                self.stats.hits += 1;
                self.entries.get(key).map(|entry| entry.payload.clone())
            }
            Some(false) => {
                self.entries.pop(key);
                self.stats.misses += 1;
                None
            }
            None => {
                self.stats.misses += 1;
                None
            }
        }
    }

    /// Store `payload` under `key` for `ttl`, replacing any previous entry.
    pub fn insert(&mut self, key: String, payload: Value, ttl: Duration) {
        let entry = CacheEntry {
            payload,
            expires_at: Instant::now().checked_add(ttl),
        };

        if self.entries.contains(&key) {
            self.entries.put(key, entry);
            return;
        }

        if let Some((evicted, _)) = self.entries.push(key, entry) {
            self.stats.evictions += 1;
            tracing::debug!(endpoint = %evicted, "Evicted least recently used cache entry");
        }
    }

    /// Remove one entry. Returns whether it existed.
    pub fn remove(&mut self, key: &str) -> bool {
        self.entries.pop(key).is_some()
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&mut self) -> usize {
        let now = Instant::now();
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| !entry.is_fresh(now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            self.entries.pop(key);
        }
        expired.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.entries.cap().get()
    }

    /// Snapshot of the counters.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            ..self.stats
        }
    }
}
