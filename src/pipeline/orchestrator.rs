//! The launch saga.
//!
//! One call to [`LaunchPipeline::launch`] drives a whole run:
//! validate, allocate a mint identity, build the immutable context, publish
//! assets, persist records, forge and execute the chain sequence, and on any
//! failure run compensation while distinguishing a clean failure from one
//! that left an irreversible mint on-chain.

use crate::clients::{ChainClient, ObjectStore, ReadCache, WalletSigner};
use crate::config::{PersistOrdering, PipelineConfig};
use crate::error::LaunchError;
use crate::metrics::PipelineMetrics;
use crate::pipeline::assets::{AssetPublisher, PublishedAssets};
use crate::pipeline::compensation::CompensationCoordinator;
use crate::pipeline::context::{ContextBuilder, CreationContext};
use crate::pipeline::executor::TransactionExecutor;
use crate::pipeline::forge::TransactionForge;
use crate::pipeline::keypair_pool::KeypairPool;
use crate::pipeline::persistence::PersistenceWriter;
use crate::pipeline::tracker::CreationStateTracker;
use crate::storage::LaunchStore;
use crate::types::{
    fee_bps_for_tier, CreationStatus, LaunchRequest, LaunchResult, StatusFields,
};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Keypair;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

struct RunFailure {
    error: LaunchError,
    partial: bool,
    token_address: Option<String>,
}

pub struct LaunchPipeline {
    config: PipelineConfig,
    metrics: PipelineMetrics,
    pool: KeypairPool,
    context_builder: ContextBuilder,
    assets: AssetPublisher,
    forge: TransactionForge,
    executor: TransactionExecutor,
    persistence: PersistenceWriter,
    compensation: CompensationCoordinator,
    tracker: CreationStateTracker,
}

impl LaunchPipeline {
    /// Wire a pipeline from its collaborators. Everything is injected; the
    /// pipeline holds no global state and two pipelines over the same store
    /// coexist safely.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn LaunchStore>,
        cache: Arc<dyn ReadCache>,
        chain: Arc<dyn ChainClient>,
        signer: Arc<dyn WalletSigner>,
        objects: Arc<dyn ObjectStore>,
        platform_authority: Arc<Keypair>,
        fee_claimer: Arc<Keypair>,
        config: PipelineConfig,
    ) -> Result<Self, LaunchError> {
        let program_id = Pubkey::from_str(&config.launch_program_id).map_err(|_| {
            LaunchError::Validation(format!(
                "invalid launch program id '{}'",
                config.launch_program_id
            ))
        })?;

        let metrics = PipelineMetrics::new();
        let pool = KeypairPool::new(
            store.clone(),
            chain.clone(),
            config.pool_claim_attempts,
            metrics.clone(),
        );
        let context_builder = ContextBuilder::new(
            store.clone(),
            cache,
            Duration::from_secs(config.user_cache_ttl_seconds),
            Duration::from_secs(config.config_cache_ttl_seconds),
            metrics.clone(),
        );
        let assets = AssetPublisher::new(objects);
        let forge = TransactionForge::new(
            chain.clone(),
            program_id,
            platform_authority,
            fee_claimer,
            config.memo_brand.clone(),
            config.chain_retry.max_attempts,
        );
        let executor = TransactionExecutor::new(
            chain.clone(),
            signer,
            config.chain_retry.clone(),
            metrics.clone(),
        );
        let persistence = PersistenceWriter::new(store.clone());
        let compensation = CompensationCoordinator::new(store.clone(), chain, metrics.clone());
        let tracker = CreationStateTracker::new(store);

        Ok(Self {
            config,
            metrics,
            pool,
            context_builder,
            assets,
            forge,
            executor,
            persistence,
            compensation,
            tracker,
        })
    }

    pub fn metrics(&self) -> PipelineMetrics {
        self.metrics.clone()
    }

    pub fn keypair_pool(&self) -> &KeypairPool {
        &self.pool
    }

    pub fn tracker(&self) -> &CreationStateTracker {
        &self.tracker
    }

    /// Run one launch end to end. Never panics and never returns `Err`; every
    /// outcome is a [`LaunchResult`] with the run id for later inspection.
    #[instrument(skip(self, request), fields(wallet_id = %request.wallet_id, symbol = %request.symbol))]
    pub async fn launch(&self, request: LaunchRequest) -> LaunchResult {
        let run_id = match self.tracker.create_run(&request.wallet_id).await {
            Ok(run_id) => run_id,
            Err(err) => {
                error!(%err, "could not open creation run");
                return LaunchResult {
                    success: false,
                    token_address: None,
                    error: Some(err.to_string()),
                    partial_success: false,
                    run_id: Uuid::nil(),
                };
            }
        };
        self.metrics.run_started().await;

        match self.run(run_id, &request).await {
            Ok(token_address) => {
                self.metrics.run_completed().await;
                info!(%run_id, %token_address, "launch completed");
                LaunchResult {
                    success: true,
                    token_address: Some(token_address),
                    error: None,
                    partial_success: false,
                    run_id,
                }
            }
            Err(failure) => {
                self.metrics.run_failed(failure.partial).await;
                warn!(%run_id, error = %failure.error, partial = failure.partial, "launch failed");
                LaunchResult {
                    success: false,
                    token_address: failure.token_address,
                    error: Some(failure.error.to_string()),
                    partial_success: failure.partial,
                    run_id,
                }
            }
        }
    }

    async fn run(&self, run_id: Uuid, request: &LaunchRequest) -> Result<String, RunFailure> {
        self.advance(run_id, CreationStatus::Validating, StatusFields::default())
            .await;
        if let Err(err) = validate_request(request) {
            // Nothing allocated yet: fail directly, no compensation.
            self.finish_failed(run_id, &err, false).await;
            return Err(RunFailure {
                error: err,
                partial: false,
                token_address: None,
            });
        }

        self.advance(run_id, CreationStatus::Allocating, StatusFields::default())
            .await;
        let mint = self.pool.allocate().await;

        let ctx = match self.context_builder.build(run_id, request, mint).await {
            Ok(ctx) => ctx,
            Err(err) => {
                self.finish_failed(run_id, &err, false).await;
                return Err(RunFailure {
                    error: err,
                    partial: false,
                    token_address: None,
                });
            }
        };

        self.advance(
            run_id,
            CreationStatus::Uploading,
            StatusFields {
                mint_address: Some(ctx.mint.address.to_string()),
                config_address: Some(ctx.fee_config.address.to_string()),
                ..StatusFields::default()
            },
        )
        .await;
        let assets = match self.assets.publish(request, &ctx.mint.address).await {
            Ok(assets) => assets,
            Err(err) => {
                // Uploads precede persistence in this pipeline, so an upload
                // failure has nothing to compensate.
                self.finish_failed(run_id, &err, false).await;
                return Err(RunFailure {
                    error: err,
                    partial: false,
                    token_address: None,
                });
            }
        };

        if self.config.persist_ordering == PersistOrdering::BeforeChain {
            self.advance(
                run_id,
                CreationStatus::Persisting,
                StatusFields {
                    metadata_url: Some(assets.metadata_url.clone()),
                    image_url: Some(assets.image_url.clone()),
                    ..StatusFields::default()
                },
            )
            .await;
            if let Some(err) = self.persist(run_id, &ctx, request, &assets).await {
                return Err(self.compensate_and_fail(run_id, &ctx, err, false).await);
            }
        }

        self.advance(
            run_id,
            CreationStatus::ExecutingChain,
            StatusFields {
                metadata_url: Some(assets.metadata_url.clone()),
                image_url: Some(assets.image_url.clone()),
                ..StatusFields::default()
            },
        )
        .await;

        // Forge immediately before execution: the transactions are blockhash
        // bound and single-use.
        let mut steps = match self.forge.build_steps(&ctx, request).await {
            Ok(steps) => steps,
            Err(err) => {
                return Err(self.compensate_and_fail(run_id, &ctx, err, false).await);
            }
        };

        let report = self.executor.execute(&request.wallet_id, &mut steps).await;
        for step in &report.confirmed {
            if let Err(err) = self.tracker.record_completed(run_id, step).await {
                warn!(%run_id, %step, %err, "could not record completed chain step");
            }
        }
        if let Some(err) = report.error {
            if let Some(failed) = report.steps.iter().find(|s| !s.success) {
                if let Err(log_err) = self.tracker.record_failed(run_id, &failed.name).await {
                    warn!(%run_id, step = %failed.name, %log_err, "could not record failed chain step");
                }
            }
            return Err(self.compensate_and_fail(run_id, &ctx, err, true).await);
        }

        // With persist-after-chain the writes happen here, while the status
        // stays at ExecutingChain; the status machine only moves forward.
        if self.config.persist_ordering == PersistOrdering::AfterChain {
            if let Some(err) = self.persist(run_id, &ctx, request, &assets).await {
                return Err(self.compensate_and_fail(run_id, &ctx, err, true).await);
            }
        }

        self.advance(run_id, CreationStatus::Completed, StatusFields::default())
            .await;
        Ok(ctx.mint.address.to_string())
    }

    /// Persist the run's rows, mirroring every completed write into the step
    /// log before any error propagates.
    async fn persist(
        &self,
        run_id: Uuid,
        ctx: &CreationContext,
        request: &LaunchRequest,
        assets: &PublishedAssets,
    ) -> Option<LaunchError> {
        let report = self.persistence.write(ctx, request, assets).await;
        for step in &report.completed {
            if let Err(err) = self.tracker.record_completed(run_id, step).await {
                warn!(%run_id, %step, %err, "could not record completed persistence step");
            }
        }
        report.error
    }

    /// Shared failure path for anything after context build: derive the
    /// compensation plan from the recorded steps, run it, and close the run.
    async fn compensate_and_fail(
        &self,
        run_id: Uuid,
        ctx: &CreationContext,
        error: LaunchError,
        chain_phase: bool,
    ) -> RunFailure {
        let completed = match self.tracker.get(run_id).await {
            Ok(state) => state.completed_steps,
            Err(err) => {
                warn!(%run_id, %err, "could not load step log, compensating from nothing");
                Vec::new()
            }
        };

        let mint_exists = self.compensation.mint_exists(ctx, &completed).await;
        if chain_phase {
            let status = if mint_exists {
                CreationStatus::ChainFailedPartial
            } else {
                CreationStatus::ChainFailedClean
            };
            self.advance(
                run_id,
                status,
                StatusFields {
                    error: Some(error.to_string()),
                    partial: Some(mint_exists),
                    ..StatusFields::default()
                },
            )
            .await;
        }

        let final_error = match self
            .compensation
            .run(ctx, &completed, mint_exists, &error)
            .await
        {
            Ok(()) => error,
            Err(compensation_error) => compensation_error,
        };

        self.finish_failed(run_id, &final_error, mint_exists).await;
        RunFailure {
            token_address: mint_exists.then(|| ctx.mint.address.to_string()),
            error: final_error,
            partial: mint_exists,
        }
    }

    /// Status updates are observational; a tracker hiccup is logged and does
    /// not abort the run it describes.
    async fn advance(&self, run_id: Uuid, status: CreationStatus, fields: StatusFields) {
        if let Err(err) = self.tracker.update_status(run_id, status, fields).await {
            warn!(%run_id, status = status.as_str(), %err, "status update failed");
        }
    }

    async fn finish_failed(&self, run_id: Uuid, error: &LaunchError, partial: bool) {
        self.advance(
            run_id,
            CreationStatus::Failed,
            StatusFields {
                error: Some(error.to_string()),
                partial: Some(partial),
                ..StatusFields::default()
            },
        )
        .await;
    }
}

fn validate_request(request: &LaunchRequest) -> Result<(), LaunchError> {
    if request.name.trim().is_empty() || request.name.len() > 64 {
        return Err(LaunchError::Validation(
            "coin name must be 1..=64 characters".to_string(),
        ));
    }
    if request.symbol.trim().is_empty() || request.symbol.len() > 10 {
        return Err(LaunchError::Validation(
            "coin symbol must be 1..=10 characters".to_string(),
        ));
    }
    if request.curve.total_supply == 0 {
        return Err(LaunchError::Validation(
            "total supply must be positive".to_string(),
        ));
    }
    if request.curve.migration_threshold == 0 {
        return Err(LaunchError::Validation(
            "migration threshold must be positive".to_string(),
        ));
    }
    if fee_bps_for_tier(&request.curve.fee_tier).is_none() {
        return Err(LaunchError::Validation(format!(
            "unknown fee tier '{}'",
            request.curve.fee_tier
        )));
    }
    if request.image.bytes.is_empty() {
        return Err(LaunchError::Validation(
            "image payload is empty".to_string(),
        ));
    }
    if request.image.extension.trim().is_empty() {
        return Err(LaunchError::Validation(
            "image extension is missing".to_string(),
        ));
    }
    Ok(())
}
