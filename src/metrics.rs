//! Lightweight pipeline counters.
//!
//! No exporter; callers pull a snapshot and ship it wherever they report from.

use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Default, Clone)]
pub struct MetricsSnapshot {
    pub runs_started: u64,
    pub runs_completed: u64,
    pub runs_failed: u64,
    pub runs_partial: u64,
    pub pool_claims: u64,
    pub pool_fallbacks: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub chain_retries: u64,
    pub compensations_run: u64,
}

/// Shared counter set, cheap to clone into every component.
#[derive(Debug, Clone, Default)]
pub struct PipelineMetrics {
    inner: Arc<RwLock<MetricsSnapshot>>,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn snapshot(&self) -> MetricsSnapshot {
        self.inner.read().await.clone()
    }

    pub async fn run_started(&self) {
        self.inner.write().await.runs_started += 1;
    }

    pub async fn run_completed(&self) {
        self.inner.write().await.runs_completed += 1;
    }

    pub async fn run_failed(&self, partial: bool) {
        let mut m = self.inner.write().await;
        m.runs_failed += 1;
        if partial {
            m.runs_partial += 1;
        }
    }

    pub async fn pool_claim(&self) {
        self.inner.write().await.pool_claims += 1;
    }

    pub async fn pool_fallback(&self) {
        self.inner.write().await.pool_fallbacks += 1;
    }

    pub async fn cache_hit(&self) {
        self.inner.write().await.cache_hits += 1;
    }

    pub async fn cache_miss(&self) {
        self.inner.write().await.cache_misses += 1;
    }

    pub async fn chain_retry(&self) {
        self.inner.write().await.chain_retries += 1;
    }

    pub async fn compensation_run(&self) {
        self.inner.write().await.compensations_run += 1;
    }
}
