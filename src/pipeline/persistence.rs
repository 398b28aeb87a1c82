//! Durable writes for a launch.
//!
//! Everything written here must be reversible by the compensation plan, so
//! each write is reported as a named step the moment it lands. The report is
//! returned even when a later write fails: compensation is derived from what
//! actually happened, never from what was intended.

use crate::error::LaunchError;
use crate::pipeline::assets::PublishedAssets;
use crate::pipeline::context::CreationContext;
use crate::storage::LaunchStore;
use crate::types::{CoinRecord, CoinStatus, CurveConfigRecord, LaunchRequest};
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, instrument, warn};

pub const STEP_CONFIG_SAVED: &str = "config_saved";
pub const STEP_COIN_SAVED: &str = "coin_saved";
pub const STEP_COUNT_INCREMENTED: &str = "creator_count_incremented";

#[derive(Debug, Default)]
pub struct PersistReport {
    /// Step names in completion order.
    pub completed: Vec<String>,
    pub error: Option<LaunchError>,
}

pub struct PersistenceWriter {
    store: Arc<dyn LaunchStore>,
}

impl PersistenceWriter {
    pub fn new(store: Arc<dyn LaunchStore>) -> Self {
        Self { store }
    }

    #[instrument(skip(self, ctx, request, assets), fields(mint = %ctx.mint.address))]
    pub async fn write(
        &self,
        ctx: &CreationContext,
        request: &LaunchRequest,
        assets: &PublishedAssets,
    ) -> PersistReport {
        let mut report = PersistReport::default();

        if ctx.fee_config.is_newly_created {
            let candidate = CurveConfigRecord {
                config_address: ctx.fee_config.address.to_string(),
                total_supply: ctx.curve.total_supply,
                fee_tier: ctx.curve.fee_tier.clone(),
            };
            match self.store.get_or_create_config(&candidate).await {
                Ok(winner) if winner.config_address == candidate.config_address => {
                    report.completed.push(STEP_CONFIG_SAVED.to_string());
                }
                Ok(winner) => {
                    // A concurrent run persisted the same (supply, tier)
                    // first. The row is theirs; compensation must not touch it.
                    warn!(
                        ours = %candidate.config_address,
                        theirs = %winner.config_address,
                        "lost fee config race, row belongs to the other run"
                    );
                }
                Err(err) => {
                    report.error = Some(err.into());
                    return report;
                }
            }
        }

        let fee_rate_bps = match ctx.curve.fee_bps() {
            Some(bps) => bps,
            None => {
                report.error = Some(LaunchError::Validation(format!(
                    "unknown fee tier '{}'",
                    ctx.curve.fee_tier
                )));
                return report;
            }
        };

        let coin = CoinRecord {
            coin_address: ctx.mint.address.to_string(),
            name: request.name.clone(),
            symbol: request.symbol.clone(),
            description: request.description.clone(),
            category: request.category.clone(),
            creator_id: ctx.requester.user_id,
            tagged_wallet: ctx
                .beneficiary
                .as_ref()
                .map(|user| user.wallet_address.clone()),
            fee_rate_bps,
            metadata_uri: assets.metadata_url.clone(),
            is_graduated: false,
            status: CoinStatus::Active,
            created_at: Utc::now(),
        };
        if let Err(err) = self.store.insert_coin(&coin).await {
            report.error = Some(err.into());
            return report;
        }
        report.completed.push(STEP_COIN_SAVED.to_string());

        if let Err(err) = self
            .store
            .adjust_coins_created(ctx.requester.user_id, 1)
            .await
        {
            report.error = Some(err.into());
            return report;
        }
        report.completed.push(STEP_COUNT_INCREMENTED.to_string());

        info!(steps = report.completed.len(), "persisted launch records");
        report
    }
}
