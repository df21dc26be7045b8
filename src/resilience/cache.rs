//! Bounded TTL cache for GET responses.
//!
//! Entries expire lazily: a stale entry is only removed when it is read or
//! when it is the eviction victim. When full, the entry with the oldest
//! insertion time is evicted. Reads never refresh an entry, so this is not LRU.

use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::config::schema::CacheConfig;
use crate::observability::metrics;

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    stored_at: Instant,
    ttl: Duration,
    /// Insertion sequence; breaks ties between identical `stored_at`.
    seq: u64,
}

impl<V> CacheEntry<V> {
    fn is_fresh(&self, now: Instant) -> bool {
        now.duration_since(self.stored_at) <= self.ttl
    }
}

#[derive(Debug)]
struct CacheState<V> {
    config: CacheConfig,
    entries: HashMap<String, CacheEntry<V>>,
    next_seq: u64,
}

/// Thread-safe cache keyed by request fingerprint.
#[derive(Debug)]
pub struct TtlCache<V> {
    service: String,
    state: Mutex<CacheState<V>>,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(service: impl Into<String>, config: CacheConfig) -> Self {
        Self {
            service: service.into(),
            state: Mutex::new(CacheState {
                config,
                entries: HashMap::new(),
                next_seq: 0,
            }),
        }
    }

    /// Look up a fresh entry.
    pub async fn get(&self, key: &str) -> Option<V> {
        let mut state = self.state.lock().await;
        if !state.config.enabled {
            return None;
        }

        let now = Instant::now();
        let fresh = state.entries.get(key).map(|entry| entry.is_fresh(now));
        match fresh {
            Some(true) => state.entries.get(key).map(|entry| entry.value.clone()),
            Some(false) => {
                state.entries.remove(key);
                metrics::record_cache_size(&self.service, state.entries.len());
                None
            }
            None => None,
        }
    }

    /// Store a value with the configured TTL.
    pub async fn insert(&self, key: impl Into<String>, value: V) {
        self.store(key.into(), value, None).await;
    }

    /// Store a value with its own TTL.
    pub async fn insert_with_ttl(&self, key: impl Into<String>, value: V, ttl: Duration) {
        self.store(key.into(), value, Some(ttl)).await;
    }

    async fn store(&self, key: String, value: V, ttl: Option<Duration>) {
        let mut state = self.state.lock().await;
        if !state.config.enabled || state.config.max_size == 0 {
            return;
        }

        if !state.entries.contains_key(&key) && state.entries.len() >= state.config.max_size {
            let victim = state
                .entries
                .iter()
                .min_by_key(|(_, entry)| (entry.stored_at, entry.seq))
                .map(|(k, _)| k.clone());
            if let Some(victim) = victim {
                tracing::debug!(service = %self.service, key = %victim, "Evicting oldest cache entry");
                state.entries.remove(&victim);
            }
        }

        let seq = state.next_seq;
        state.next_seq += 1;
        let ttl = ttl.unwrap_or(Duration::from_secs(state.config.ttl_secs));
        state.entries.insert(
            key,
            CacheEntry {
                value,
                stored_at: Instant::now(),
                ttl,
                seq,
            },
        );
        metrics::record_cache_size(&self.service, state.entries.len());
    }

    /// Drop every entry.
    pub async fn clear(&self) {
        let mut state = self.state.lock().await;
        state.entries.clear();
        metrics::record_cache_size(&self.service, 0);
        tracing::info!(service = %self.service, "Cache cleared");
    }

    /// Number of stored entries, stale ones included until they are touched.
    pub async fn len(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Replace the cache settings. Existing entries are discarded.
    pub async fn update_config(&self, config: CacheConfig) {
        let mut state = self.state.lock().await;
        state.entries.clear();
        tracing::info!(
            service = %self.service,
            enabled = config.enabled,
            ttl_secs = config.ttl_secs,
            max_size = config.max_size,
            "Cache configuration updated"
        );
        state.config = config;
        metrics::record_cache_size(&self.service, 0);
    }

    pub async fn config(&self) -> CacheConfig {
        self.state.lock().await.config.clone()
    }
}
