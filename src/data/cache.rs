//! In-memory query cache
//!
//! Volatile, cleared on restart. Entries expire lazily: staleness is
//! checked on read, and only capacity pressure triggers a sweep.
//! Keys are namespaced as `{table}:...` so a whole table can be dropped
//! with one prefix invalidation.

use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

const CACHE_NAME: &str = "query";

/// Cached value with its insertion time
#[derive(Debug, Clone)]
struct CacheEntry {
    /// Stored value; `Value::Null` records an empty single-row result
    value: Value,
    inserted_at: Instant,
}

impl CacheEntry {
    fn is_fresh(&self, ttl: Duration) -> bool {
        self.inserted_at.elapsed() < ttl
    }
}

/// Process-wide cache for query results
///
/// Shared by every `Table` through `AppState`.
pub struct QueryCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    ttl: Duration,
    max_entries: usize,
}

impl QueryCache {
    /// Create new query cache
    ///
    /// # Arguments
    /// * `ttl` - Freshness window for every entry
    /// * `max_entries` - Upper bound on stored keys
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
            max_entries: max_entries.max(1),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Look up a fresh entry
    ///
    /// Returns `None` on a miss or when the entry is stale. A stored
    /// null comes back as `Some(Value::Null)`.
    pub async fn get(&self, key: &str) -> Option<Value> {
        use crate::metrics::{CACHE_HITS_TOTAL, CACHE_MISSES_TOTAL};

        let entries = self.entries.read().await;
        match entries.get(key) {
            Some(entry) if entry.is_fresh(self.ttl) => {
                tracing::debug!(key, "Query cache hit");
                CACHE_HITS_TOTAL.with_label_values(&[CACHE_NAME]).inc();
                Some(entry.value.clone())
            }
            _ => {
                tracing::debug!(key, "Query cache miss");
                CACHE_MISSES_TOTAL.with_label_values(&[CACHE_NAME]).inc();
                None
            }
        }
    }

    /// Store a value, overwriting any previous entry for the key
    pub async fn set(&self, key: impl Into<String>, value: Value) {
        let key = key.into();
        let mut entries = self.entries.write().await;

        if !entries.contains_key(&key) && entries.len() >= self.max_entries {
            let pruned = Self::prune_expired_locked(&mut entries, self.ttl);
            if pruned > 0 {
                tracing::debug!(pruned, "Pruned expired query cache entries");
            }
            if entries.len() >= self.max_entries {
                Self::evict_oldest_locked(&mut entries);
            }
        }

        entries.insert(
            key,
            CacheEntry {
                value,
                inserted_at: Instant::now(),
            },
        );

        use crate::metrics::CACHE_SIZE;
        CACHE_SIZE
            .with_label_values(&[CACHE_NAME])
            .set(entries.len() as i64);
    }

    /// Remove every key starting with `prefix`
    ///
    /// # Returns
    /// Number of removed entries
    pub async fn invalidate_prefix(&self, prefix: &str) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(prefix));
        let removed = before - entries.len();

        tracing::debug!(prefix, removed, "Invalidated query cache prefix");

        use crate::metrics::{CACHE_INVALIDATIONS_TOTAL, CACHE_SIZE};
        CACHE_INVALIDATIONS_TOTAL
            .with_label_values(&[CACHE_NAME])
            .inc_by(removed as u64);
        CACHE_SIZE
            .with_label_values(&[CACHE_NAME])
            .set(entries.len() as i64);

        removed
    }

    /// Number of stored entries, stale ones included
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    fn prune_expired_locked(entries: &mut HashMap<String, CacheEntry>, ttl: Duration) -> usize {
        let before = entries.len();
        entries.retain(|_, entry| entry.is_fresh(ttl));
        before - entries.len()
    }

    fn evict_oldest_locked(entries: &mut HashMap<String, CacheEntry>) -> bool {
        let Some(oldest_key) = entries
            .iter()
            .min_by_key(|(_, entry)| entry.inserted_at)
            .map(|(key, _)| key.clone())
        else {
            return false;
        };
        entries.remove(&oldest_key);
        true
    }
}
