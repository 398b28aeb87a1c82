//! Creation-run state tracking.
//!
//! Append-only, forward-only bookkeeping of a run. The tracker is purely
//! observational: it records what the pipeline did, it does not drive
//! resumption of interrupted runs. A run that dies mid-flight stays at its
//! last recorded status.

use crate::error::LaunchError;
use crate::storage::LaunchStore;
use crate::types::{CreationState, CreationStatus, StatusFields};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, instrument};
use uuid::Uuid;

pub struct CreationStateTracker {
    store: Arc<dyn LaunchStore>,
}

impl CreationStateTracker {
    pub fn new(store: Arc<dyn LaunchStore>) -> Self {
        Self { store }
    }

    /// Open a run at `Pending`.
    pub async fn create_run(&self, wallet_id: &str) -> Result<Uuid, LaunchError> {
        let now = Utc::now();
        let state = CreationState {
            id: Uuid::new_v4(),
            status: CreationStatus::Pending,
            wallet_id: wallet_id.to_string(),
            mint_address: None,
            config_address: None,
            metadata_url: None,
            image_url: None,
            error: None,
            partial: false,
            completed_steps: Vec::new(),
            failed_steps: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        self.store.insert_creation_state(&state).await?;
        debug!(run_id = %state.id, "opened creation run");
        Ok(state.id)
    }

    /// Move a run forward. Backward transitions and moves out of a terminal
    /// status are rejected.
    #[instrument(skip(self, fields), fields(run_id = %run_id, status = status.as_str()))]
    pub async fn update_status(
        &self,
        run_id: Uuid,
        status: CreationStatus,
        fields: StatusFields,
    ) -> Result<(), LaunchError> {
        let current = self.load(run_id).await?;
        if current.status.is_terminal() {
            return Err(LaunchError::State(format!(
                "run {run_id} is already terminal at {}",
                current.status.as_str()
            )));
        }
        if status.rank() <= current.status.rank() {
            return Err(LaunchError::State(format!(
                "backward transition {} -> {} on run {run_id}",
                current.status.as_str(),
                status.as_str()
            )));
        }
        self.store
            .update_creation_status(run_id, status, &fields)
            .await?;
        Ok(())
    }

    /// Append to the completed-step log.
    pub async fn record_completed(&self, run_id: Uuid, step: &str) -> Result<(), LaunchError> {
        self.guard_not_terminal(run_id).await?;
        self.store.append_completed_step(run_id, step).await?;
        Ok(())
    }

    /// Append to the failed-step log.
    pub async fn record_failed(&self, run_id: Uuid, step: &str) -> Result<(), LaunchError> {
        self.guard_not_terminal(run_id).await?;
        self.store.append_failed_step(run_id, step).await?;
        Ok(())
    }

    pub async fn get(&self, run_id: Uuid) -> Result<CreationState, LaunchError> {
        self.load(run_id).await
    }

    async fn guard_not_terminal(&self, run_id: Uuid) -> Result<(), LaunchError> {
        let current = self.load(run_id).await?;
        if current.status.is_terminal() {
            return Err(LaunchError::State(format!(
                "run {run_id} is terminal, step logs are frozen"
            )));
        }
        Ok(())
    }

    async fn load(&self, run_id: Uuid) -> Result<CreationState, LaunchError> {
        self.store
            .get_creation_state(run_id)
            .await?
            .ok_or_else(|| LaunchError::State(format!("unknown run {run_id}")))
    }
}
