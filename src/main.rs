//! Demo entry point for the launch pipeline.
//!
//! Wires the production clients from environment variables, bootstraps the
//! schema, tops up the key pool, and (optionally) drives one demo launch.

use anyhow::{Context, Result};
use launchpipe::clients::{HttpObjectStore, HttpWalletSigner, MokaCache, SolanaRpc};
use launchpipe::pipeline::LaunchPipeline;
use launchpipe::storage::{LaunchStore, PgLaunchStore};
use launchpipe::types::{CurveParams, ImagePayload, LaunchRequest};
use launchpipe::PipelineConfig;
use nonempty::NonEmpty;
use solana_sdk::signature::Keypair;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn, Level};

const MIN_POOLED_KEYS: i64 = 16;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    let database_url =
        std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
    let mut config = PipelineConfig::default();
    if let Ok(endpoints) = std::env::var("RPC_ENDPOINTS") {
        config.rpc_endpoints = endpoints.split(',').map(str::to_string).collect();
    }
    if let Ok(endpoint) = std::env::var("SIGNER_ENDPOINT") {
        config.signer_endpoint = endpoint;
    }
    if let Ok(base) = std::env::var("OBJECT_STORE_URL") {
        config.object_store_base_url = base;
    }

    let store = Arc::new(
        PgLaunchStore::connect(&database_url, 5)
            .await
            .context("failed to connect to Postgres")?,
    );
    store.init_schema().await?;

    let endpoints = NonEmpty::from_vec(config.rpc_endpoints.clone())
        .context("rpc_endpoints cannot be empty")?;
    let chain = Arc::new(SolanaRpc::new(
        endpoints,
        Duration::from_secs(config.rpc_timeout_seconds),
        Duration::from_millis(config.confirm_poll_interval_ms),
        config.confirm_poll_attempts,
    ));
    let signer = Arc::new(HttpWalletSigner::new(
        config.signer_endpoint.clone(),
        Duration::from_secs(config.signer_timeout_seconds),
    )?);
    let objects = Arc::new(HttpObjectStore::new(
        config.object_store_base_url.clone(),
        config.object_store_bucket.clone(),
        Duration::from_secs(config.object_store_timeout_seconds),
    )?);
    let cache = Arc::new(MokaCache::new(
        config.cache_max_entries,
        Duration::from_secs(config.config_cache_ttl_seconds),
    ));

    let platform_authority = Arc::new(load_keypair("PLATFORM_AUTHORITY_KEYPAIR")?);
    let fee_claimer = Arc::new(load_keypair("FEE_CLAIMER_KEYPAIR")?);

    let pipeline = LaunchPipeline::new(
        store.clone(),
        cache,
        chain,
        signer,
        objects,
        platform_authority,
        fee_claimer,
        config,
    )?;

    let unused = store.count_unused_keys().await?;
    info!(unused, "key pool status");
    if unused < MIN_POOLED_KEYS {
        let top_up = (MIN_POOLED_KEYS - unused) as u32;
        pipeline.keypair_pool().seed(top_up).await?;
    }

    if std::env::var("LAUNCH_DEMO").is_ok() {
        run_demo_launch(&pipeline).await?;
    } else {
        info!("pipeline ready (set LAUNCH_DEMO=1 to drive a demo launch)");
    }

    let metrics = pipeline.metrics().snapshot().await;
    info!(?metrics, "final pipeline metrics");
    Ok(())
}

async fn run_demo_launch(pipeline: &LaunchPipeline) -> Result<()> {
    let wallet_id =
        std::env::var("DEMO_WALLET_ID").unwrap_or_else(|_| "demo-wallet".to_string());
    let request = LaunchRequest {
        name: "Demo Coin".to_string(),
        symbol: "DEMO".to_string(),
        description: "launched by the launchpipe demo".to_string(),
        category: Some("demo".to_string()),
        wallet_id,
        beneficiary_handle: None,
        curve: CurveParams {
            total_supply: 1_000_000_000,
            migration_threshold: 85_000_000_000,
            fee_tier: "1".to_string(),
            decimals: 6,
        },
        image: ImagePayload {
            bytes: vec![0u8; 128],
            extension: "png".to_string(),
            content_type: "image/png".to_string(),
        },
        first_buy_lamports: 1_000_000,
    };

    let result = pipeline.launch(request).await;
    if result.success {
        info!(token = ?result.token_address, run_id = %result.run_id, "demo launch succeeded");
    } else {
        warn!(
            error = ?result.error,
            partial = result.partial_success,
            run_id = %result.run_id,
            "demo launch failed"
        );
    }
    Ok(())
}

/// Load a keypair from the JSON byte-array file named by `env_var`.
fn load_keypair(env_var: &str) -> Result<Keypair> {
    let path = std::env::var(env_var).with_context(|| format!("{env_var} must be set"))?;
    let raw = std::fs::read(&path).with_context(|| format!("failed to read {path}"))?;
    let bytes: Vec<u8> = serde_json::from_slice(&raw)
        .with_context(|| format!("{path} is not a JSON keypair file"))?;
    if bytes.len() != 64 {
        anyhow::bail!("{path}: expected 64 bytes, got {}", bytes.len());
    }
    Keypair::try_from(bytes.as_slice()).with_context(|| format!("{path}: invalid keypair"))
}
