//! Compensation after partial failure.
//!
//! The plan is derived strictly from the steps that completed, walked in
//! reverse. The one branch that matters most: once the mint is real on-chain,
//! the coin row is degrade-marked instead of deleted, because the on-chain
//! object is permanent and a record of it must survive.

use crate::clients::ChainClient;
use crate::error::LaunchError;
use crate::metrics::PipelineMetrics;
use crate::pipeline::context::CreationContext;
use crate::pipeline::forge::StepName;
use crate::pipeline::persistence::{STEP_COIN_SAVED, STEP_CONFIG_SAVED, STEP_COUNT_INCREMENTED};
use crate::storage::LaunchStore;
use std::sync::Arc;
use tracing::{info, instrument, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionKind {
    DeleteCoin { coin_address: String },
    MarkCoinFailed { coin_address: String },
    DeleteConfig { config_address: String },
    RestoreCreatorCount { user_id: i64 },
}

#[derive(Debug, Clone)]
pub struct CompensationAction {
    pub name: String,
    pub kind: ActionKind,
    /// Critical actions abort the rest of the rollback when they fail;
    /// non-critical ones are logged and skipped.
    pub critical: bool,
}

/// Ordered rollback actions, already reversed relative to completion order.
#[derive(Debug, Default)]
pub struct CompensationPlan {
    pub actions: Vec<CompensationAction>,
}

impl CompensationPlan {
    /// Build from the run's completed steps. Chain steps have no reverse
    /// action (the chain is append-only); they only influence the
    /// mint-exists branch decided by the caller.
    pub fn build(ctx: &CreationContext, completed_steps: &[String], mint_exists: bool) -> Self {
        let mut actions = Vec::new();

        for step in completed_steps.iter().rev() {
            match step.as_str() {
                STEP_COUNT_INCREMENTED => actions.push(CompensationAction {
                    name: "restore_creator_count".to_string(),
                    kind: ActionKind::RestoreCreatorCount {
                        user_id: ctx.requester.user_id,
                    },
                    critical: false,
                }),
                STEP_COIN_SAVED => {
                    let coin_address = ctx.mint.address.to_string();
                    if mint_exists {
                        actions.push(CompensationAction {
                            name: "mark_coin_failed".to_string(),
                            kind: ActionKind::MarkCoinFailed { coin_address },
                            critical: true,
                        });
                    } else {
                        actions.push(CompensationAction {
                            name: "delete_coin".to_string(),
                            kind: ActionKind::DeleteCoin { coin_address },
                            critical: true,
                        });
                    }
                }
                STEP_CONFIG_SAVED => {
                    // Only recorded when this run created the row; a config
                    // that pre-existed the run is never deleted here.
                    actions.push(CompensationAction {
                        name: "delete_config".to_string(),
                        kind: ActionKind::DeleteConfig {
                            config_address: ctx.fee_config.address.to_string(),
                        },
                        critical: true,
                    });
                }
                other if other == StepName::ConfigCreation.as_str()
                    || other == StepName::PoolCreation.as_str() => {}
                other => {
                    warn!(step = other, "no compensation action for step");
                }
            }
        }

        Self { actions }
    }
}

pub struct CompensationCoordinator {
    store: Arc<dyn LaunchStore>,
    chain: Arc<dyn ChainClient>,
    metrics: PipelineMetrics,
}

impl CompensationCoordinator {
    pub fn new(
        store: Arc<dyn LaunchStore>,
        chain: Arc<dyn ChainClient>,
        metrics: PipelineMetrics,
    ) -> Self {
        Self {
            store,
            chain,
            metrics,
        }
    }

    /// Decide whether the mint is real on-chain. A confirmed pool creation is
    /// proof; otherwise probe. A failed probe takes the degrade branch: when
    /// we cannot rule the mint out we must not delete its record.
    pub async fn mint_exists(&self, ctx: &CreationContext, completed_steps: &[String]) -> bool {
        if completed_steps
            .iter()
            .any(|s| s == StepName::PoolCreation.as_str())
        {
            return true;
        }
        match self.chain.account_exists(&ctx.mint.address).await {
            Ok(exists) => exists,
            Err(err) => {
                warn!(%err, mint = %ctx.mint.address, "existence probe failed, assuming the mint may exist");
                true
            }
        }
    }

    /// Run the rollback. Returns the original error enriched with rollback
    /// context when a critical action fails; otherwise `Ok`.
    ///
    /// Uploaded assets are deliberately left in place: deleting them would
    /// trade a persistence failure for a storage failure with no user-visible
    /// benefit.
    #[instrument(skip(self, ctx, completed_steps, original), fields(run_id = %ctx.run_id))]
    pub async fn run(
        &self,
        ctx: &CreationContext,
        completed_steps: &[String],
        mint_exists: bool,
        original: &LaunchError,
    ) -> Result<(), LaunchError> {
        self.metrics.compensation_run().await;
        let plan = CompensationPlan::build(ctx, completed_steps, mint_exists);
        info!(actions = plan.actions.len(), "running compensation plan");

        for action in &plan.actions {
            let result = match &action.kind {
                ActionKind::DeleteCoin { coin_address } => {
                    self.store.delete_coin(coin_address).await
                }
                ActionKind::MarkCoinFailed { coin_address } => {
                    self.store.mark_coin_failed(coin_address).await
                }
                ActionKind::DeleteConfig { config_address } => {
                    self.store.delete_config(config_address).await
                }
                ActionKind::RestoreCreatorCount { user_id } => {
                    self.store.adjust_coins_created(*user_id, -1).await
                }
            };

            match result {
                Ok(()) => info!(action = %action.name, "compensation action applied"),
                Err(err) if action.critical => {
                    return Err(LaunchError::Compensation {
                        action: action.name.clone(),
                        reason: err.to_string(),
                        original: original.to_string(),
                    });
                }
                Err(err) => {
                    warn!(action = %action.name, %err, "non-critical compensation action failed, continuing");
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::context::FeeConfig;
    use crate::pipeline::keypair_pool::MintIdentity;
    use crate::types::{CurveParams, UserRecord};
    use solana_sdk::signature::{Keypair, Signer};
    use std::sync::Arc;
    use uuid::Uuid;

    fn test_ctx(new_config: bool) -> CreationContext {
        let mint = Keypair::new();
        let config = Keypair::new();
        CreationContext {
            run_id: Uuid::new_v4(),
            requester: UserRecord {
                user_id: 7,
                wallet_address: Keypair::new().pubkey().to_string(),
                wallet_id: "wallet-7".to_string(),
                coins_created: 1,
            },
            beneficiary: None,
            fee_config: FeeConfig {
                address: config.pubkey(),
                is_newly_created: new_config,
                signing_key: new_config.then(|| Arc::new(config)),
            },
            mint: MintIdentity {
                address: mint.pubkey(),
                keypair: Arc::new(mint),
                from_pool: true,
            },
            curve: CurveParams {
                total_supply: 1_000_000_000,
                migration_threshold: 85_000_000_000,
                fee_tier: "1".to_string(),
                decimals: 6,
            },
        }
    }

    fn steps(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn plan_reverses_completion_order() {
        let ctx = test_ctx(true);
        let completed = steps(&[STEP_CONFIG_SAVED, STEP_COIN_SAVED, STEP_COUNT_INCREMENTED]);
        let plan = CompensationPlan::build(&ctx, &completed, false);

        let names: Vec<&str> = plan.actions.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["restore_creator_count", "delete_coin", "delete_config"]
        );
    }

    #[test]
    fn mint_on_chain_degrades_instead_of_deleting() {
        let ctx = test_ctx(false);
        let completed = steps(&[
            STEP_COIN_SAVED,
            STEP_COUNT_INCREMENTED,
            StepName::PoolCreation.as_str(),
        ]);
        let plan = CompensationPlan::build(&ctx, &completed, true);

        assert!(plan
            .actions
            .iter()
            .any(|a| matches!(a.kind, ActionKind::MarkCoinFailed { .. })));
        assert!(!plan
            .actions
            .iter()
            .any(|a| matches!(a.kind, ActionKind::DeleteCoin { .. })));
    }

    #[test]
    fn plan_is_empty_when_nothing_completed() {
        let ctx = test_ctx(true);
        let plan = CompensationPlan::build(&ctx, &[], false);
        assert!(plan.actions.is_empty());
    }

    #[test]
    fn chain_steps_have_no_reverse_action() {
        let ctx = test_ctx(true);
        let completed = steps(&[
            StepName::ConfigCreation.as_str(),
            StepName::PoolCreation.as_str(),
        ]);
        let plan = CompensationPlan::build(&ctx, &completed, true);
        assert!(plan.actions.is_empty());
    }
}
