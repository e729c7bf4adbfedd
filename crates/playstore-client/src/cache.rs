//! TTL cache backed by a concurrent map.
//!
//! Expiry is a pure function of "now vs. stored-at", applied at read time;
//! an expired entry behaves as a miss and is evicted on the spot. Writes
//! overwrite unconditionally (upstream data is an eventually-consistent
//! snapshot, so last-writer-wins is enough).

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;

#[derive(Clone)]
struct Entry<V> {
    value: Arc<V>,
    stored_at: Instant,
}

impl<V> Entry<V> {
    fn new(value: Arc<V>) -> Self {
        Self {
            value,
            stored_at: Instant::now(),
        }
    }

    fn is_expired(&self, ttl: Duration) -> bool {
        self.stored_at.elapsed() >= ttl
    }
}

/// Thread-safe key/value cache with a single TTL for all entries.
#[derive(Clone)]
pub struct TtlCache<V> {
    entries: Arc<DashMap<String, Entry<V>>>,
    ttl: Duration,
}

impl<V> TtlCache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            ttl,
        }
    }

    /// Look up a key. Expired entries count as misses and are removed.
    pub fn get(&self, key: &str) -> Option<Arc<V>> {
        let entry = self.entries.get(key)?;

        if entry.is_expired(self.ttl) {
            drop(entry); // Release the shard lock before removing.
            self.entries.remove(key);
            return None;
        }

        Some(entry.value.clone())
    }

    /// Insert or overwrite a value.
    pub fn insert(&self, key: impl Into<String>, value: V) {
        self.entries.insert(key.into(), Entry::new(Arc::new(value)));
    }

    /// Remove all expired entries. Correctness never depends on this being
    /// called; it only trims memory.
    pub fn cleanup_expired(&self) -> usize {
        let before = self.entries.len();
        let ttl = self.ttl;
        self.entries.retain(|_, entry| !entry.is_expired(ttl));
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entry_count: self.entries.len(),
            ttl: self.ttl,
        }
    }
}

/// Point-in-time cache counters, surfaced by the health endpoint.
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub entry_count: usize,
    pub ttl: Duration,
}
