//! Read-through cache seam.
//!
//! The cache is never authoritative: a miss, an expired entry, or a cache
//! failure all fall through to the relational store. Values are JSON so one
//! cache serves user profiles and fee configs alike.

use async_trait::async_trait;
use moka::future::Cache;
use serde_json::Value;
use std::time::{Duration, Instant};

#[async_trait]
pub trait ReadCache: Send + Sync {
    async fn get(&self, key: &str) -> Option<Value>;
    async fn set(&self, key: &str, value: Value, ttl: Duration);
    async fn delete(&self, key: &str);
    /// Liveness probe; a dead cache degrades reads to the store, nothing more.
    async fn ping(&self) -> bool;
}

/// In-process implementation. Entries carry their own expiry so different
/// key families can use different TTLs inside one cache.
pub struct MokaCache {
    inner: Cache<String, (Instant, Value)>,
}

impl MokaCache {
    /// `max_ttl` bounds how long any entry can live regardless of the TTL it
    /// was set with; `max_entries` bounds memory.
    pub fn new(max_entries: u64, max_ttl: Duration) -> Self {
        let inner = Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(max_ttl)
            .build();
        Self { inner }
    }
}

#[async_trait]
impl ReadCache for MokaCache {
    async fn get(&self, key: &str) -> Option<Value> {
        match self.inner.get(key).await {
            Some((expires_at, value)) if Instant::now() < expires_at => Some(value),
            Some(_) => {
                self.inner.invalidate(key).await;
                None
            }
            None => None,
        }
    }

    async fn set(&self, key: &str, value: Value, ttl: Duration) {
        self.inner
            .insert(key.to_string(), (Instant::now() + ttl, value))
            .await;
    }

    async fn delete(&self, key: &str) {
        self.inner.invalidate(key).await;
    }

    async fn ping(&self) -> bool {
        true
    }
}
