//! Pipeline configuration.

use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};

/// When durable rows are written relative to chain execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PersistOrdering {
    /// Write rows before submitting transactions. The coin is queryable as
    /// soon as it is persisted, which means a reader may observe a Coin row
    /// before on-chain finality; a chain failure afterwards is undone by
    /// compensation. This is the default.
    BeforeChain,
    /// Write rows only after the whole chain sequence confirms. Nothing is
    /// visible until chain success, and a crash mid-pipeline leaves no coin
    /// row behind.
    AfterChain,
}

/// Static configuration for one [`LaunchPipeline`](crate::pipeline::LaunchPipeline).
///
/// Loaded from the environment or a config file by the caller; every field has
/// a usable default except the endpoints, which are validated when the clients
/// are constructed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Solana RPC endpoints, first is preferred. Must not be empty.
    pub rpc_endpoints: Vec<String>,
    pub rpc_timeout_seconds: u64,

    /// Custodial wallet signer service.
    pub signer_endpoint: String,
    pub signer_timeout_seconds: u64,

    /// Object storage for images and metadata.
    pub object_store_base_url: String,
    pub object_store_bucket: String,
    pub object_store_timeout_seconds: u64,

    /// Read-through cache TTLs.
    pub user_cache_ttl_seconds: u64,
    pub config_cache_ttl_seconds: u64,
    pub cache_max_entries: u64,

    /// Bounded attempts when claiming a vetted key from the pool before
    /// falling back to a freshly generated keypair.
    pub pool_claim_attempts: u32,

    /// Retry policy applied to retryable chain steps.
    pub chain_retry: RetryPolicy,

    /// Confirmation polling at `confirmed` commitment.
    pub confirm_poll_interval_ms: u64,
    pub confirm_poll_attempts: u32,

    pub persist_ordering: PersistOrdering,

    /// The on-chain launch program the forge targets.
    pub launch_program_id: String,
    /// Branding memo embedded in every pool-creation transaction.
    pub memo_brand: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            rpc_endpoints: vec!["https://api.mainnet-beta.solana.com".to_string()],
            rpc_timeout_seconds: 10,
            signer_endpoint: "http://localhost:9230".to_string(),
            signer_timeout_seconds: 10,
            object_store_base_url: "http://localhost:9000".to_string(),
            object_store_bucket: "launch-assets".to_string(),
            object_store_timeout_seconds: 15,
            user_cache_ttl_seconds: 600,
            config_cache_ttl_seconds: 1800,
            cache_max_entries: 10_000,
            pool_claim_attempts: 10,
            chain_retry: RetryPolicy::default(),
            confirm_poll_interval_ms: 500,
            confirm_poll_attempts: 60,
            persist_ordering: PersistOrdering::BeforeChain,
            launch_program_id: "7865gwBsjC4WyPph5KTVkXUTi9e3ahYjrdvyffEfzxF".to_string(),
            memo_brand: "launchpipe".to_string(),
        }
    }
}
