// Copyright (c) Circle Ledger Contributors
// SPDX-License-Identifier: Apache-2.0

//! Injected key-value abstraction with optional TTL.
//!
//! Components that need fallback/cache maps take an `Arc<dyn KvCache<V>>`
//! instead of owning a process-wide map, so tests can swap in a fresh
//! in-memory instance and a real cache can be slotted in later.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// String-keyed async cache. Values are cloned out on read.
#[async_trait]
pub trait KvCache<V: Clone + Send + Sync + 'static>: Send + Sync {
    async fn get(&self, key: &str) -> Option<V>;

    async fn put(&self, key: &str, value: V);

    /// Insert with a time-to-live; the entry is gone after `ttl` elapses
    async fn put_with_ttl(&self, key: &str, value: V, ttl: Duration);

    async fn remove(&self, key: &str) -> Option<V>;

    async fn keys(&self) -> Vec<String>;

    async fn len(&self) -> usize;
}

struct Entry<V> {
    value: V,
    expires_at: Option<Instant>,
}

impl<V> Entry<V> {
    fn is_expired(&self) -> bool {
        self.expires_at.map(|t| Instant::now() >= t).unwrap_or(false)
    }
}

/// In-memory TTL cache with hit/miss counters.
pub struct InMemoryKvCache<V> {
    entries: RwLock<HashMap<String, Entry<V>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<V> InMemoryKvCache<V> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn stats(&self) -> KvCacheStats {
        KvCacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

impl<V> Default for InMemoryKvCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<V: Clone + Send + Sync + 'static> KvCache<V> for InMemoryKvCache<V> {
    async fn get(&self, key: &str) -> Option<V> {
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(entry) if !entry.is_expired() => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Some(entry.value.clone());
                }
                Some(_) => {} // expired, fall through to removal
                None => {
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    return None;
                }
            }
        }
        // Lazily drop the expired entry
        let mut entries = self.entries.write().await;
        if entries.get(key).map(|e| e.is_expired()).unwrap_or(false) {
            entries.remove(key);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    async fn put(&self, key: &str, value: V) {
        let mut entries = self.entries.write().await;
        entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: None,
            },
        );
    }

    async fn put_with_ttl(&self, key: &str, value: V, ttl: Duration) {
        let mut entries = self.entries.write().await;
        entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: Some(Instant::now() + ttl),
            },
        );
    }

    async fn remove(&self, key: &str) -> Option<V> {
        let mut entries = self.entries.write().await;
        entries.remove(key).map(|e| e.value)
    }

    async fn keys(&self) -> Vec<String> {
        let entries = self.entries.read().await;
        entries
            .iter()
            .filter(|(_, e)| !e.is_expired())
            .map(|(k, _)| k.clone())
            .collect()
    }

    async fn len(&self) -> usize {
        let entries = self.entries.read().await;
        entries.values().filter(|e| !e.is_expired()).count()
    }
}

/// Hit/miss counters for monitoring
#[derive(Debug, Clone, Copy)]
pub struct KvCacheStats {
    pub hits: u64,
    pub misses: u64,
}
