//! Per-run context resolution.
//!
//! The context is built once, before anything irreversible happens, and is
//! read-only afterwards. User profiles and fee configs resolve through the
//! read-through cache; the cache is never authoritative.

use crate::clients::ReadCache;
use crate::error::LaunchError;
use crate::metrics::PipelineMetrics;
use crate::pipeline::keypair_pool::MintIdentity;
use crate::storage::LaunchStore;
use crate::types::{CurveConfigRecord, CurveParams, LaunchRequest, UserRecord};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signer};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

/// Shared curve-parameter account for this run. When `is_newly_created` the
/// account does not exist yet anywhere; `signing_key` holds the keypair the
/// config-creation transaction must sign with.
#[derive(Clone)]
pub struct FeeConfig {
    pub address: Pubkey,
    pub is_newly_created: bool,
    pub signing_key: Option<Arc<Keypair>>,
}

impl std::fmt::Debug for FeeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeeConfig")
            .field("address", &self.address)
            .field("is_newly_created", &self.is_newly_created)
            .finish()
    }
}

/// Immutable inputs of one launch run.
#[derive(Debug, Clone)]
pub struct CreationContext {
    pub run_id: Uuid,
    pub requester: UserRecord,
    pub beneficiary: Option<UserRecord>,
    pub fee_config: FeeConfig,
    pub mint: MintIdentity,
    pub curve: CurveParams,
}

/// Normalize a fee-share handle: strip one leading `@`, drop everything
/// outside `[A-Za-z0-9_]`, lowercase. `None` when nothing valid remains or
/// the result exceeds 15 chars.
pub fn normalize_handle(raw: &str) -> Option<String> {
    let stripped = raw.strip_prefix('@').unwrap_or(raw);
    let normalized: String = stripped
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .map(|c| c.to_ascii_lowercase())
        .collect();
    if normalized.is_empty() || normalized.len() > 15 {
        return None;
    }
    Some(normalized)
}

pub struct ContextBuilder {
    store: Arc<dyn LaunchStore>,
    cache: Arc<dyn ReadCache>,
    user_ttl: Duration,
    config_ttl: Duration,
    metrics: PipelineMetrics,
}

impl ContextBuilder {
    pub fn new(
        store: Arc<dyn LaunchStore>,
        cache: Arc<dyn ReadCache>,
        user_ttl: Duration,
        config_ttl: Duration,
        metrics: PipelineMetrics,
    ) -> Self {
        Self {
            store,
            cache,
            user_ttl,
            config_ttl,
            metrics,
        }
    }

    /// Resolve everything a run needs. User-not-found and an unknown fee tier
    /// are fatal; beneficiary resolution failure is logged and dropped.
    #[instrument(skip(self, request, mint), fields(run_id = %run_id, wallet_id = %request.wallet_id))]
    pub async fn build(
        &self,
        run_id: Uuid,
        request: &LaunchRequest,
        mint: MintIdentity,
    ) -> Result<CreationContext, LaunchError> {
        if request.curve.fee_bps().is_none() {
            return Err(LaunchError::Validation(format!(
                "unknown fee tier '{}'",
                request.curve.fee_tier
            )));
        }

        let requester = self.resolve_requester(&request.wallet_id).await?;
        let fee_config = self.resolve_fee_config(&request.curve).await?;
        let beneficiary = match &request.beneficiary_handle {
            Some(handle) => self.resolve_beneficiary(handle).await,
            None => None,
        };

        Ok(CreationContext {
            run_id,
            requester,
            beneficiary,
            fee_config,
            mint,
            curve: request.curve.clone(),
        })
    }

    async fn resolve_requester(&self, wallet_id: &str) -> Result<UserRecord, LaunchError> {
        let cache_key = format!("user:{wallet_id}");
        if let Some(value) = self.cache.get(&cache_key).await {
            if let Ok(user) = serde_json::from_value::<UserRecord>(value) {
                self.metrics.cache_hit().await;
                return Ok(user);
            }
        }
        self.metrics.cache_miss().await;

        let user = self
            .store
            .find_user_by_wallet_id(wallet_id)
            .await?
            .ok_or_else(|| {
                LaunchError::Validation(format!("no user for wallet id '{wallet_id}'"))
            })?;

        if let Ok(value) = serde_json::to_value(&user) {
            self.cache.set(&cache_key, value, self.user_ttl).await;
        }
        Ok(user)
    }

    async fn resolve_fee_config(&self, curve: &CurveParams) -> Result<FeeConfig, LaunchError> {
        let cache_key = format!("config:{}:{}", curve.total_supply, curve.fee_tier);
        if let Some(value) = self.cache.get(&cache_key).await {
            if let Ok(record) = serde_json::from_value::<CurveConfigRecord>(value) {
                if let Ok(address) = Pubkey::from_str(&record.config_address) {
                    self.metrics.cache_hit().await;
                    return Ok(FeeConfig {
                        address,
                        is_newly_created: false,
                        signing_key: None,
                    });
                }
            }
        }
        self.metrics.cache_miss().await;

        if let Some(record) = self
            .store
            .find_config(curve.total_supply, &curve.fee_tier)
            .await?
        {
            let address = Pubkey::from_str(&record.config_address).map_err(|_| {
                LaunchError::Validation(format!(
                    "stored config address '{}' is not a valid pubkey",
                    record.config_address
                ))
            })?;
            if let Ok(value) = serde_json::to_value(&record) {
                self.cache.set(&cache_key, value, self.config_ttl).await;
            }
            return Ok(FeeConfig {
                address,
                is_newly_created: false,
                signing_key: None,
            });
        }

        // Unseen (supply, tier): mint a config identity for this run. The row
        // and the on-chain account both come later; only persisted configs go
        // into the cache.
        let keypair = Keypair::new();
        debug!(address = %keypair.pubkey(), "synthesized new fee config identity");
        Ok(FeeConfig {
            address: keypair.pubkey(),
            is_newly_created: true,
            signing_key: Some(Arc::new(keypair)),
        })
    }

    /// Best effort: a bad handle or a store hiccup drops the beneficiary, it
    /// never fails the run.
    async fn resolve_beneficiary(&self, raw_handle: &str) -> Option<UserRecord> {
        let normalized = match normalize_handle(raw_handle) {
            Some(normalized) => normalized,
            None => {
                warn!(raw_handle, "rejecting malformed beneficiary handle");
                return None;
            }
        };

        match self.store.get_or_create_user_by_handle(&normalized).await {
            Ok(user) => Some(user),
            Err(err) => {
                warn!(%err, handle = %normalized, "beneficiary resolution failed, continuing without");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn normalization_cases() {
        assert_eq!(normalize_handle("@Foo_Bar").as_deref(), Some("foo_bar"));
        assert_eq!(normalize_handle("foo_bar").as_deref(), Some("foo_bar"));
        assert_eq!(normalize_handle("FOO_BAR").as_deref(), Some("foo_bar"));
        assert_eq!(normalize_handle("@user.name!").as_deref(), Some("username"));
        assert_eq!(normalize_handle(""), None);
        assert_eq!(normalize_handle("@"), None);
        assert_eq!(normalize_handle("!!!"), None);
        assert_eq!(normalize_handle("a_very_long_handle"), None);
        // 15 chars is the last accepted length.
        assert_eq!(
            normalize_handle("abcdefghijklmno").as_deref(),
            Some("abcdefghijklmno")
        );
        assert_eq!(normalize_handle("abcdefghijklmnop"), None);
    }

    proptest! {
        #[test]
        fn normalized_handles_are_canonical(raw in "\\PC{0,40}") {
            if let Some(normalized) = normalize_handle(&raw) {
                prop_assert!(!normalized.is_empty() && normalized.len() <= 15);
                prop_assert!(normalized
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_'));
                // Normalization is idempotent.
                prop_assert_eq!(normalize_handle(&normalized), Some(normalized));
            }
        }
    }
}
