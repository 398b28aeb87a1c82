//! Blockchain RPC access.
//!
//! [`ChainClient`] is the seam the pipeline talks through; [`SolanaRpc`] is the
//! production implementation over the nonblocking RPC client. Every call runs
//! under an explicit deadline so a stalled endpoint cannot wedge a run.

use async_trait::async_trait;
use nonempty::NonEmpty;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::{
    commitment_config::CommitmentConfig, hash::Hash, pubkey::Pubkey, signature::Signature,
    transaction::Transaction,
};
use solana_transaction_status::TransactionStatus;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum ChainError {
    /// Transport-level failure talking to the RPC endpoint.
    #[error("rpc transport error: {0}")]
    Transport(String),

    /// The cluster accepted the request but rejected the transaction.
    #[error("transaction rejected: {0}")]
    Rejected(String),

    /// The signature did not reach the requested commitment in time.
    #[error("confirmation not reached for {signature}")]
    Unconfirmed { signature: String },

    #[error("rpc call timed out after {0:?}")]
    Deadline(Duration),
}

/// Minimal chain surface the pipeline needs.
#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn latest_blockhash(&self) -> Result<Hash, ChainError>;

    /// Submit a fully signed transaction, returning its signature.
    async fn submit_transaction(&self, tx: &Transaction) -> Result<Signature, ChainError>;

    /// Await `confirmed` commitment for a submitted signature.
    async fn confirm_signature(&self, signature: &Signature) -> Result<(), ChainError>;

    async fn account_exists(&self, address: &Pubkey) -> Result<bool, ChainError>;
}

/// RPC client pool over one or more endpoints, first preferred.
pub struct SolanaRpc {
    clients: NonEmpty<Arc<RpcClient>>,
    call_timeout: Duration,
    confirm_poll_interval: Duration,
    confirm_poll_attempts: u32,
}

impl SolanaRpc {
    pub fn new(
        endpoints: NonEmpty<String>,
        call_timeout: Duration,
        confirm_poll_interval: Duration,
        confirm_poll_attempts: u32,
    ) -> Self {
        let clients = endpoints.map(|endpoint| {
            Arc::new(RpcClient::new_with_timeout(endpoint, call_timeout))
        });
        Self {
            clients,
            call_timeout,
            confirm_poll_interval,
            confirm_poll_attempts,
        }
    }

    fn client(&self) -> &RpcClient {
        self.clients.first()
    }

    async fn with_deadline<T, F>(&self, fut: F) -> Result<T, ChainError>
    where
        F: std::future::Future<Output = Result<T, solana_client::client_error::ClientError>>,
    {
        match timeout(self.call_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(ChainError::Transport(err.to_string())),
            Err(_) => Err(ChainError::Deadline(self.call_timeout)),
        }
    }
}

#[async_trait]
impl ChainClient for SolanaRpc {
    async fn latest_blockhash(&self) -> Result<Hash, ChainError> {
        self.with_deadline(self.client().get_latest_blockhash()).await
    }

    async fn submit_transaction(&self, tx: &Transaction) -> Result<Signature, ChainError> {
        let signature = self.with_deadline(self.client().send_transaction(tx)).await?;
        debug!(%signature, "submitted transaction");
        Ok(signature)
    }

    async fn confirm_signature(&self, signature: &Signature) -> Result<(), ChainError> {
        let commitment = CommitmentConfig::confirmed();
        for _ in 0..self.confirm_poll_attempts {
            let response = self
                .with_deadline(self.client().get_signature_statuses(&[*signature]))
                .await?;
            let status: Option<&TransactionStatus> =
                response.value.first().and_then(|s| s.as_ref());

            if let Some(status) = status {
                if let Some(err) = &status.err {
                    return Err(ChainError::Rejected(err.to_string()));
                }
                if status.satisfies_commitment(commitment) {
                    return Ok(());
                }
            }
            tokio::time::sleep(self.confirm_poll_interval).await;
        }

        warn!(%signature, "confirmation window exhausted");
        Err(ChainError::Unconfirmed {
            signature: signature.to_string(),
        })
    }

    async fn account_exists(&self, address: &Pubkey) -> Result<bool, ChainError> {
        let response = self
            .with_deadline(
                self.client()
                    .get_account_with_commitment(address, CommitmentConfig::confirmed()),
            )
            .await?;
        Ok(response.value.is_some())
    }
}
