//! Error taxonomy for the launch pipeline.
//!
//! The orchestrator and every component speak [`LaunchError`]; the storage
//! layer has its own [`StoreError`] that folds into it. The taxonomy mirrors
//! how failures are handled: validation errors carry no side effects, chain
//! errors are retried per step policy, persistence errors trigger
//! compensation, and compensation errors carry the original failure alongside
//! the rollback failure.

use thiserror::Error;

/// Storage-layer failures.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A row the operation requires does not exist.
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    /// A persisted value could not be decoded into its domain type.
    #[error("corrupt row in {entity}: {reason}")]
    Corrupt { entity: &'static str, reason: String },
}

/// Top-level error for launch runs.
#[derive(Error, Debug)]
pub enum LaunchError {
    /// Request rejected before anything was allocated. No side effects.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Asset upload failed. Fatal for the run.
    #[error("asset upload failed ({kind}): {reason}")]
    Upload { kind: &'static str, reason: String },

    /// The custodial signer refused or failed to co-sign.
    #[error("remote signing failed for step {step}: {reason}")]
    Signer { step: String, reason: String },

    /// Submission of a signed transaction failed.
    #[error("chain submission failed at step {step}: {reason}")]
    ChainSubmission { step: String, reason: String },

    /// A submitted transaction did not reach confirmed commitment.
    #[error("chain confirmation failed at step {step} ({signature}): {reason}")]
    ChainConfirmation {
        step: String,
        signature: String,
        reason: String,
    },

    /// A durable write failed. Triggers compensation.
    #[error("persistence failed: {0}")]
    Persistence(#[from] StoreError),

    /// Creation-state bookkeeping was misused (backward transition, append
    /// after a terminal status).
    #[error("creation state error: {0}")]
    State(String),

    /// A critical compensation action failed. Carries both the rollback
    /// failure and the error that started the rollback.
    #[error("compensation action '{action}' failed: {reason} (original failure: {original})")]
    Compensation {
        action: String,
        reason: String,
        original: String,
    },
}

impl LaunchError {
    /// Chain errors are the only ones the executor will re-attempt; everything
    /// else propagates immediately.
    pub fn is_chain_error(&self) -> bool {
        matches!(
            self,
            LaunchError::ChainSubmission { .. } | LaunchError::ChainConfirmation { .. }
        )
    }
}
