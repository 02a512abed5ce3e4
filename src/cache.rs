//! Short-TTL lookup cache.
//!
//! Channel metadata changes rarely but is needed on every manifest request;
//! a TTL cache keeps the channel service off the hot path while still
//! picking up configuration changes within seconds.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// A cached value.
#[derive(Clone, Debug)]
struct CachedEntry<V> {
    value: V,
    stored_at: Instant,
}

/// Thread-safe cache with TTL-based invalidation.
#[derive(Clone, Debug)]
pub struct TtlCache<V> {
    entries: Arc<DashMap<String, CachedEntry<V>>>,
    ttl: Duration,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            ttl,
        }
    }

    /// Returns `Some(value)` if a fresh entry exists, `None` otherwise.
    pub fn get(&self, key: &str) -> Option<V> {
        if let Some(entry) = self.entries.get(key) {
            if entry.stored_at.elapsed() < self.ttl {
                debug!("Cache HIT for {}", key);
                return Some(entry.value.clone());
            }
            // Stale: drop the read guard before removing
            drop(entry);
            self.entries.remove(key);
        }
        debug!("Cache MISS for {}", key);
        None
    }

    pub fn insert(&self, key: &str, value: V) {
        self.entries.insert(
            key.to_string(),
            CachedEntry {
                value,
                stored_at: Instant::now(),
            },
        );
    }

    /// Drop expired entries.
    pub fn purge_expired(&self) {
        self.entries
            .retain(|_, entry| entry.stored_at.elapsed() < self.ttl);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
