//! Mint identity allocation.
//!
//! Every launch needs a keypair that becomes the token's canonical address.
//! Vetted keypairs are pre-generated into the `keys` table; allocation claims
//! one per run with skip-locked semantics so concurrent runs never contend on
//! the same row. The pool degrades instead of failing: when it is exhausted
//! (or the store is down) the allocator falls back to a freshly generated
//! keypair with weaker provenance but the same functional contract.

use crate::clients::ChainClient;
use crate::metrics::PipelineMetrics;
use crate::storage::LaunchStore;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signer};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// The on-chain identity a run exclusively owns. Never reused.
#[derive(Clone)]
pub struct MintIdentity {
    pub address: Pubkey,
    pub keypair: Arc<Keypair>,
    /// False when the pool was exhausted and the key was generated on the fly.
    pub from_pool: bool,
}

impl std::fmt::Debug for MintIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Key material stays out of logs.
        f.debug_struct("MintIdentity")
            .field("address", &self.address)
            .field("from_pool", &self.from_pool)
            .finish()
    }
}

pub struct KeypairPool {
    store: Arc<dyn LaunchStore>,
    chain: Arc<dyn ChainClient>,
    max_attempts: u32,
    metrics: PipelineMetrics,
}

impl KeypairPool {
    pub fn new(
        store: Arc<dyn LaunchStore>,
        chain: Arc<dyn ChainClient>,
        max_attempts: u32,
        metrics: PipelineMetrics,
    ) -> Self {
        Self {
            store,
            chain,
            max_attempts,
            metrics,
        }
    }

    /// Allocate a mint identity. This never fails the caller: exhausting the
    /// claim budget, an empty pool, or a store outage all degrade to a fresh
    /// random keypair.
    pub async fn allocate(&self) -> MintIdentity {
        for attempt in 1..=self.max_attempts {
            let claim = match self.store.claim_unused_key().await {
                Ok(Some(claim)) => claim,
                Ok(None) => {
                    debug!("key pool is empty");
                    break;
                }
                Err(err) => {
                    warn!(%err, "key pool claim failed, degrading to fresh keypair");
                    break;
                }
            };

            let keypair = match decode_keypair(&claim.private_key, &claim.public_key) {
                Some(keypair) => keypair,
                None => {
                    // Row stays consumed; a bad key must never come back.
                    warn!(key_id = claim.id, "discarding undecodable pool key");
                    continue;
                }
            };

            let address = keypair.pubkey();
            match self.chain.account_exists(&address).await {
                Ok(false) => {
                    debug!(%address, attempt, "allocated vetted mint identity");
                    self.metrics.pool_claim().await;
                    return MintIdentity {
                        address,
                        keypair: Arc::new(keypair),
                        from_pool: true,
                    };
                }
                Ok(true) => {
                    warn!(%address, key_id = claim.id, "pool key already exists on-chain, discarding");
                }
                Err(err) => {
                    // Unverifiable keys are treated like collisions: the row
                    // stays consumed and the loop moves on.
                    warn!(%address, %err, "existence probe failed, discarding claim");
                }
            }
        }

        info!("falling back to freshly generated mint keypair");
        self.metrics.pool_fallback().await;
        let keypair = Keypair::new();
        MintIdentity {
            address: keypair.pubkey(),
            keypair: Arc::new(keypair),
            from_pool: false,
        }
    }

    /// Pre-generate `count` vetted keypairs into the pool.
    pub async fn seed(&self, count: u32) -> Result<(), crate::error::StoreError> {
        for _ in 0..count {
            let keypair = Keypair::new();
            let private_key = bs58::encode(keypair.to_bytes()).into_string();
            self.store
                .add_pool_key(&private_key, &keypair.pubkey().to_string())
                .await?;
        }
        info!(count, "seeded key pool");
        Ok(())
    }
}

/// Decode base58 key material and verify it derives the stored address.
fn decode_keypair(private_key: &str, public_key: &str) -> Option<Keypair> {
    let bytes = bs58::decode(private_key).into_vec().ok()?;
    if bytes.len() != 64 {
        return None;
    }
    let keypair = Keypair::try_from(bytes.as_slice()).ok()?;
    if keypair.pubkey().to_string() != public_key {
        return None;
    }
    Some(keypair)
}
