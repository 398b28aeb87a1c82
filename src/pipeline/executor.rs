//! Ordered transaction execution.
//!
//! Steps run strictly one after another: later steps depend on the on-chain
//! effects of earlier ones, so there is no parallelism here by design. Each
//! step is locally signed, co-signed by the custodial signer, submitted, and
//! confirmed before the next one starts.

use crate::clients::{ChainClient, WalletSigner};
use crate::error::LaunchError;
use crate::metrics::PipelineMetrics;
use crate::pipeline::forge::{StepState, TransactionStep};
use crate::retry::RetryPolicy;
use solana_sdk::signature::{Keypair, Signature};
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Outcome of one step attempt sequence.
#[derive(Debug)]
pub struct StepReport {
    pub name: String,
    pub success: bool,
    pub signature: Option<Signature>,
    pub error: Option<String>,
    pub attempts: u32,
}

/// Outcome of the whole ordered sequence. `confirmed` lists step names in
/// completion order; on failure, steps after the failed one were never
/// attempted and appear nowhere.
#[derive(Debug, Default)]
pub struct ExecutionReport {
    pub steps: Vec<StepReport>,
    pub confirmed: Vec<String>,
    pub error: Option<LaunchError>,
}

pub struct TransactionExecutor {
    chain: Arc<dyn ChainClient>,
    signer: Arc<dyn WalletSigner>,
    retry: RetryPolicy,
    metrics: PipelineMetrics,
}

impl TransactionExecutor {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        signer: Arc<dyn WalletSigner>,
        retry: RetryPolicy,
        metrics: PipelineMetrics,
    ) -> Self {
        Self {
            chain,
            signer,
            retry,
            metrics,
        }
    }

    #[instrument(skip(self, steps), fields(step_count = steps.len()))]
    pub async fn execute(
        &self,
        wallet_id: &str,
        steps: &mut [TransactionStep],
    ) -> ExecutionReport {
        let mut report = ExecutionReport::default();

        for step in steps.iter_mut() {
            match self.run_step(wallet_id, step).await {
                Ok((signature, attempts)) => {
                    step.state = StepState::Confirmed;
                    info!(step = %step.name, %signature, attempts, "step confirmed");
                    report.confirmed.push(step.name.as_str().to_string());
                    report.steps.push(StepReport {
                        name: step.name.as_str().to_string(),
                        success: true,
                        signature: Some(signature),
                        error: None,
                        attempts,
                    });
                }
                Err((err, attempts)) => {
                    step.state = StepState::Failed;
                    warn!(step = %step.name, %err, attempts, "step failed, aborting sequence");
                    report.steps.push(StepReport {
                        name: step.name.as_str().to_string(),
                        success: false,
                        signature: None,
                        error: Some(err.to_string()),
                        attempts,
                    });
                    report.error = Some(err);
                    break;
                }
            }
        }

        report
    }

    async fn run_step(
        &self,
        wallet_id: &str,
        step: &mut TransactionStep,
    ) -> Result<(Signature, u32), (LaunchError, u32)> {
        // Local signatures first, against the blockhash the forge bound.
        let blockhash = step.tx.message.recent_blockhash;
        if !step.local_signers.is_empty() {
            let signers: Vec<&Keypair> = step.local_signers.iter().map(AsRef::as_ref).collect();
            step.tx
                .try_partial_sign(&signers, blockhash)
                .map_err(|e| {
                    (
                        LaunchError::Signer {
                            step: step.name.as_str().to_string(),
                            reason: format!("local signing failed: {e}"),
                        },
                        0,
                    )
                })?;
        }

        if step.requires_remote_signature {
            step.tx = self
                .signer
                .sign_transaction(wallet_id, &step.tx)
                .await
                .map_err(|e| {
                    (
                        LaunchError::Signer {
                            step: step.name.as_str().to_string(),
                            reason: e.to_string(),
                        },
                        0,
                    )
                })?;
        }
        step.state = StepState::Signed;

        let attempts_allowed = if step.retryable { step.max_attempts.max(1) } else { 1 };
        let policy = RetryPolicy {
            max_attempts: attempts_allowed,
            ..self.retry.clone()
        };
        let mut delays = policy.delays();
        let mut attempts = 0;

        loop {
            attempts += 1;
            match self.attempt(step).await {
                Ok(signature) => return Ok((signature, attempts)),
                Err(err) => match delays.next() {
                    Some(delay) => {
                        // TODO: probe the signature status before resubmitting
                        // after an ambiguous send failure; as written a retry
                        // can double-submit.
                        warn!(step = %step.name, %err, attempts, "retrying chain step");
                        self.metrics.chain_retry().await;
                        tokio::time::sleep(delay).await;
                    }
                    None => return Err((err, attempts)),
                },
            }
        }
    }

    async fn attempt(&self, step: &mut TransactionStep) -> Result<Signature, LaunchError> {
        let signature = self
            .chain
            .submit_transaction(&step.tx)
            .await
            .map_err(|e| LaunchError::ChainSubmission {
                step: step.name.as_str().to_string(),
                reason: e.to_string(),
            })?;
        step.state = StepState::Submitted;

        self.chain
            .confirm_signature(&signature)
            .await
            .map_err(|e| LaunchError::ChainConfirmation {
                step: step.name.as_str().to_string(),
                signature: signature.to_string(),
                reason: e.to_string(),
            })?;

        Ok(signature)
    }
}
