//! Custodial wallet signer client.
//!
//! The platform never holds end-user key material. Every launch transaction
//! names the requester as fee payer, so each one makes a round trip to the
//! signer service for the user's co-signature. The wire format is the usual
//! one for Solana transactions in JSON bodies: base64 over bincode.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use solana_sdk::transaction::Transaction;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum SignerError {
    #[error("signer transport error: {0}")]
    Transport(String),

    /// The service answered but refused the request.
    #[error("signer rejected wallet {wallet_id}: {status} {body}")]
    Rejected {
        wallet_id: String,
        status: u16,
        body: String,
    },

    /// The response body could not be decoded into a transaction.
    #[error("signer returned an undecodable transaction: {0}")]
    Encoding(String),
}

#[async_trait]
pub trait WalletSigner: Send + Sync {
    /// Co-sign `tx` with the key custodied for `wallet_id`.
    async fn sign_transaction(
        &self,
        wallet_id: &str,
        tx: &Transaction,
    ) -> Result<Transaction, SignerError>;
}

#[derive(Serialize)]
struct SignRequest<'a> {
    transaction: &'a str,
    encoding: &'static str,
}

#[derive(Deserialize)]
struct SignResponse {
    signed_transaction: String,
}

/// HTTP implementation against the custodial signer service.
pub struct HttpWalletSigner {
    http: reqwest::Client,
    endpoint: String,
    call_timeout: Duration,
}

impl HttpWalletSigner {
    pub fn new(endpoint: String, call_timeout: Duration) -> Result<Self, SignerError> {
        let http = reqwest::Client::builder()
            .timeout(call_timeout)
            .build()
            .map_err(|e| SignerError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            call_timeout,
        })
    }
}

#[async_trait]
impl WalletSigner for HttpWalletSigner {
    async fn sign_transaction(
        &self,
        wallet_id: &str,
        tx: &Transaction,
    ) -> Result<Transaction, SignerError> {
        let bytes = bincode::serialize(tx).map_err(|e| SignerError::Encoding(e.to_string()))?;
        let encoded = BASE64.encode(bytes);
        let url = format!("{}/v1/wallets/{}/sign", self.endpoint, wallet_id);

        let response = self
            .http
            .post(&url)
            .timeout(self.call_timeout)
            .json(&SignRequest {
                transaction: &encoded,
                encoding: "base64",
            })
            .send()
            .await
            .map_err(|e| SignerError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SignerError::Rejected {
                wallet_id: wallet_id.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        let body: SignResponse = response
            .json()
            .await
            .map_err(|e| SignerError::Encoding(e.to_string()))?;

        let raw = BASE64
            .decode(body.signed_transaction.as_bytes())
            .map_err(|e| SignerError::Encoding(e.to_string()))?;
        let signed: Transaction =
            bincode::deserialize(&raw).map_err(|e| SignerError::Encoding(e.to_string()))?;

        debug!(wallet_id, "obtained remote co-signature");
        Ok(signed)
    }
}
