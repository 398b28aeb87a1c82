//! Read-through resolution in the context builder.

mod common;

use common::MemoryStore;
use launchpipe::clients::MokaCache;
use launchpipe::metrics::PipelineMetrics;
use launchpipe::pipeline::{ContextBuilder, MintIdentity};
use launchpipe::storage::LaunchStore;
use launchpipe::types::{CurveParams, ImagePayload, LaunchRequest};
use solana_sdk::signature::{Keypair, Signer};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

fn builder(store: &Arc<MemoryStore>) -> ContextBuilder {
    ContextBuilder::new(
        store.clone(),
        Arc::new(MokaCache::new(64, Duration::from_secs(1800))),
        Duration::from_secs(600),
        Duration::from_secs(1800),
        PipelineMetrics::new(),
    )
}

fn mint() -> MintIdentity {
    let keypair = Keypair::new();
    MintIdentity {
        address: keypair.pubkey(),
        keypair: Arc::new(keypair),
        from_pool: true,
    }
}

fn request(wallet_id: &str) -> LaunchRequest {
    LaunchRequest {
        name: "Ctx Coin".to_string(),
        symbol: "CTX".to_string(),
        description: String::new(),
        category: None,
        wallet_id: wallet_id.to_string(),
        beneficiary_handle: None,
        curve: CurveParams {
            total_supply: 1_000_000_000,
            migration_threshold: 85_000_000_000,
            fee_tier: "1".to_string(),
            decimals: 6,
        },
        image: ImagePayload {
            bytes: vec![1],
            extension: "png".to_string(),
            content_type: "image/png".to_string(),
        },
        first_buy_lamports: 0,
    }
}

#[tokio::test]
async fn unknown_requester_is_fatal() {
    let store = Arc::new(MemoryStore::new());
    let err = builder(&store)
        .build(Uuid::new_v4(), &request("nobody"), mint())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("no user for wallet id"));
}

#[tokio::test]
async fn requester_reads_come_from_the_cache_within_ttl() {
    let store = Arc::new(MemoryStore::new());
    let user = store
        .create_user(&Keypair::new().pubkey().to_string(), "wallet-9")
        .await
        .unwrap();
    let builder = builder(&store);

    let first = builder
        .build(Uuid::new_v4(), &request("wallet-9"), mint())
        .await
        .unwrap();
    assert_eq!(first.requester.coins_created, 0);

    // Mutate the store behind the cache; the cached profile still serves.
    store.adjust_coins_created(user.user_id, 1).await.unwrap();
    let second = builder
        .build(Uuid::new_v4(), &request("wallet-9"), mint())
        .await
        .unwrap();
    assert_eq!(second.requester.coins_created, 0);
}

#[tokio::test]
async fn unseen_curve_key_synthesizes_a_new_config() {
    let store = Arc::new(MemoryStore::new());
    store
        .create_user(&Keypair::new().pubkey().to_string(), "wallet-9")
        .await
        .unwrap();
    let builder = builder(&store);

    let ctx = builder
        .build(Uuid::new_v4(), &request("wallet-9"), mint())
        .await
        .unwrap();

    assert!(ctx.fee_config.is_newly_created);
    assert!(ctx.fee_config.signing_key.is_some());
}

#[tokio::test]
async fn persisted_config_resolves_as_existing() {
    let store = Arc::new(MemoryStore::new());
    store
        .create_user(&Keypair::new().pubkey().to_string(), "wallet-9")
        .await
        .unwrap();
    let builder = builder(&store);

    let first = builder
        .build(Uuid::new_v4(), &request("wallet-9"), mint())
        .await
        .unwrap();
    let record = launchpipe::types::CurveConfigRecord {
        config_address: first.fee_config.address.to_string(),
        total_supply: 1_000_000_000,
        fee_tier: "1".to_string(),
    };
    store.get_or_create_config(&record).await.unwrap();

    let second = builder
        .build(Uuid::new_v4(), &request("wallet-9"), mint())
        .await
        .unwrap();

    assert!(!second.fee_config.is_newly_created);
    assert!(second.fee_config.signing_key.is_none());
    assert_eq!(second.fee_config.address, first.fee_config.address);
}
