//! Allocation properties of the keypair pool: concurrent claims are pairwise
//! distinct, consumed rows never come back, and the pool degrades to fresh
//! keypairs instead of failing.

mod common;

use common::{seed_pool_key, MemoryStore, MockChain};
use launchpipe::metrics::PipelineMetrics;
use launchpipe::pipeline::KeypairPool;
use launchpipe::storage::LaunchStore;
use std::collections::HashSet;
use std::sync::Arc;

fn pool(store: &Arc<MemoryStore>, chain: &Arc<MockChain>) -> KeypairPool {
    KeypairPool::new(store.clone(), chain.clone(), 10, PipelineMetrics::new())
}

#[tokio::test]
async fn concurrent_allocations_are_pairwise_distinct() {
    let store = Arc::new(MemoryStore::new());
    let chain = Arc::new(MockChain::new());
    for _ in 0..5 {
        seed_pool_key(&store).await;
    }
    let pool = Arc::new(pool(&store, &chain));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let pool = pool.clone();
        handles.push(tokio::spawn(async move { pool.allocate().await }));
    }

    let mut addresses = HashSet::new();
    let mut pooled = 0;
    for handle in handles {
        let identity = handle.await.unwrap();
        assert!(addresses.insert(identity.address), "duplicate mint identity");
        if identity.from_pool {
            pooled += 1;
        }
    }

    // Exactly min(N, M) vetted keys were handed out, the rest degraded.
    assert_eq!(pooled, 5);
    assert_eq!(store.consumed_key_count(), 5);
    assert_eq!(store.count_unused_keys().await.unwrap(), 0);
}

#[tokio::test]
async fn on_chain_collision_discards_the_claim() {
    let store = Arc::new(MemoryStore::new());
    let chain = Arc::new(MockChain::new());
    let first = seed_pool_key(&store).await;
    let second = seed_pool_key(&store).await;
    chain.mark_existing(first);

    let identity = pool(&store, &chain).allocate().await;

    assert_eq!(identity.address, second);
    assert!(identity.from_pool);
    // The collided row stays consumed; it is never reclaimed.
    assert_eq!(store.consumed_key_count(), 2);
}

#[tokio::test]
async fn undecodable_material_is_skipped() {
    let store = Arc::new(MemoryStore::new());
    let chain = Arc::new(MockChain::new());
    store
        .add_pool_key("not-valid-base58!!", "not-a-pubkey")
        .await
        .unwrap();
    let good = seed_pool_key(&store).await;

    let identity = pool(&store, &chain).allocate().await;

    assert_eq!(identity.address, good);
    assert_eq!(store.consumed_key_count(), 2);
}

#[tokio::test]
async fn exhausted_pool_degrades_to_a_fresh_keypair() {
    let store = Arc::new(MemoryStore::new());
    let chain = Arc::new(MockChain::new());
    let metrics = PipelineMetrics::new();
    let pool = KeypairPool::new(store.clone(), chain.clone(), 10, metrics.clone());

    let identity = pool.allocate().await;

    assert!(!identity.from_pool);
    assert_eq!(metrics.snapshot().await.pool_fallbacks, 1);
}
