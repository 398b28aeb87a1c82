//! Transaction assembly.
//!
//! The forge turns a creation context into the ordered, unsigned transaction
//! set for one launch. Transactions are blockhash-bound and single-use, so the
//! forge fetches a fresh blockhash at wrap time and must run immediately
//! before execution; its output is never cached across run retries.

use crate::clients::ChainClient;
use crate::error::LaunchError;
use crate::pipeline::context::CreationContext;
use crate::types::LaunchRequest;
use solana_sdk::instruction::{AccountMeta, Instruction};
use solana_sdk::message::Message;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signer as _};
use solana_sdk::system_program;
use solana_sdk::transaction::Transaction;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, instrument};

/// SPL memo program, carrier of the branding memo on pool creation.
const MEMO_PROGRAM_ID: Pubkey = solana_sdk::pubkey!("MemoSq4gqABAXKb96qnH8TysNcWxMyWCqXgDLGmfcHr");

/// Anchor-style instruction discriminators of the launch program.
const CONFIG_INIT_DISCRIMINATOR: [u8; 8] = [155, 12, 170, 224, 30, 250, 204, 130];
const POOL_CREATE_DISCRIMINATOR: [u8; 8] = [233, 146, 209, 142, 207, 104, 64, 188];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepName {
    ConfigCreation,
    PoolCreation,
}

impl StepName {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepName::ConfigCreation => "config_creation",
            StepName::PoolCreation => "pool_creation",
        }
    }
}

impl std::fmt::Display for StepName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Execution state of one step, advanced by the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepState {
    Pending,
    Signed,
    Submitted,
    Confirmed,
    Failed,
}

/// One ordered unit of chain work.
pub struct TransactionStep {
    pub name: StepName,
    pub tx: Transaction,
    pub local_signers: Vec<Arc<Keypair>>,
    /// Whether the custodial signer must co-sign. Always true today: the
    /// requester is fee payer on every launch transaction.
    pub requires_remote_signature: bool,
    pub retryable: bool,
    pub max_attempts: u32,
    pub state: StepState,
}

impl std::fmt::Debug for TransactionStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionStep")
            .field("name", &self.name)
            .field("local_signers", &self.local_signers.len())
            .field("retryable", &self.retryable)
            .field("max_attempts", &self.max_attempts)
            .field("state", &self.state)
            .finish()
    }
}

pub struct TransactionForge {
    chain: Arc<dyn ChainClient>,
    program_id: Pubkey,
    platform_authority: Arc<Keypair>,
    /// Platform-held fee-claimer key; co-signs pool creation when a
    /// beneficiary is attached so fee shares can be escrowed for them.
    fee_claimer: Arc<Keypair>,
    memo_brand: String,
    max_attempts: u32,
}

impl TransactionForge {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        program_id: Pubkey,
        platform_authority: Arc<Keypair>,
        fee_claimer: Arc<Keypair>,
        memo_brand: String,
        max_attempts: u32,
    ) -> Self {
        Self {
            chain,
            program_id,
            platform_authority,
            fee_claimer,
            memo_brand,
            max_attempts,
        }
    }

    /// Build the ordered transaction set: `[config_creation?, pool_creation]`.
    /// The config step appears only when this run synthesized a new fee
    /// config; otherwise pool creation references the existing account.
    #[instrument(skip(self, ctx, request), fields(mint = %ctx.mint.address))]
    pub async fn build_steps(
        &self,
        ctx: &CreationContext,
        request: &LaunchRequest,
    ) -> Result<Vec<TransactionStep>, LaunchError> {
        let fee_payer = Pubkey::from_str(&ctx.requester.wallet_address).map_err(|_| {
            LaunchError::Validation(format!(
                "requester wallet address '{}' is not a valid pubkey",
                ctx.requester.wallet_address
            ))
        })?;
        let fee_bps = ctx.curve.fee_bps().ok_or_else(|| {
            LaunchError::Validation(format!("unknown fee tier '{}'", ctx.curve.fee_tier))
        })?;

        let mut steps = Vec::with_capacity(2);

        if ctx.fee_config.is_newly_created {
            let config_key = ctx.fee_config.signing_key.clone().ok_or_else(|| {
                LaunchError::State(
                    "newly created fee config is missing its signing key".to_string(),
                )
            })?;
            let ix = self.config_init_instruction(ctx, &fee_payer, fee_bps);
            let tx = self.wrap(&[ix], &fee_payer).await?;
            steps.push(TransactionStep {
                name: StepName::ConfigCreation,
                tx,
                local_signers: vec![config_key],
                requires_remote_signature: true,
                retryable: true,
                max_attempts: self.max_attempts,
                state: StepState::Pending,
            });
        }

        let mut local_signers = vec![ctx.mint.keypair.clone(), self.platform_authority.clone()];
        if ctx.beneficiary.is_some() {
            local_signers.push(self.fee_claimer.clone());
        }

        let pool_ix = self.pool_create_instruction(ctx, &fee_payer, fee_bps, request);
        let memo_ix = self.branding_memo(request);
        let tx = self.wrap(&[pool_ix, memo_ix], &fee_payer).await?;
        steps.push(TransactionStep {
            name: StepName::PoolCreation,
            tx,
            local_signers,
            requires_remote_signature: true,
            retryable: true,
            max_attempts: self.max_attempts,
            state: StepState::Pending,
        });

        debug!(step_count = steps.len(), "forged launch transactions");
        Ok(steps)
    }

    fn config_init_instruction(
        &self,
        ctx: &CreationContext,
        payer: &Pubkey,
        fee_bps: u16,
    ) -> Instruction {
        let mut data = Vec::with_capacity(8 + 8 + 8 + 2 + 1);
        data.extend_from_slice(&CONFIG_INIT_DISCRIMINATOR);
        data.extend_from_slice(&ctx.curve.total_supply.to_le_bytes());
        data.extend_from_slice(&ctx.curve.migration_threshold.to_le_bytes());
        data.extend_from_slice(&fee_bps.to_le_bytes());
        data.push(ctx.curve.decimals);

        Instruction {
            program_id: self.program_id,
            accounts: vec![
                AccountMeta::new(ctx.fee_config.address, true),
                AccountMeta::new(*payer, true),
                AccountMeta::new_readonly(system_program::id(), false),
            ],
            data,
        }
    }

    fn pool_create_instruction(
        &self,
        ctx: &CreationContext,
        payer: &Pubkey,
        fee_bps: u16,
        request: &LaunchRequest,
    ) -> Instruction {
        let mint = ctx.mint.address;
        let (pool, _bump) =
            Pubkey::find_program_address(&[b"pool", mint.as_ref()], &self.program_id);

        let mut data = Vec::with_capacity(8 + 8 + 2 + 1);
        data.extend_from_slice(&POOL_CREATE_DISCRIMINATOR);
        data.extend_from_slice(&request.first_buy_lamports.to_le_bytes());
        data.extend_from_slice(&fee_bps.to_le_bytes());
        data.push(u8::from(ctx.beneficiary.is_some()));

        let mut accounts = vec![
            AccountMeta::new_readonly(ctx.fee_config.address, false),
            AccountMeta::new(mint, true),
            AccountMeta::new(pool, false),
            AccountMeta::new(*payer, true),
            AccountMeta::new_readonly(self.platform_authority.pubkey(), true),
            AccountMeta::new_readonly(system_program::id(), false),
        ];
        if ctx.beneficiary.is_some() {
            accounts.push(AccountMeta::new_readonly(self.fee_claimer.pubkey(), true));
        }

        Instruction {
            program_id: self.program_id,
            accounts,
            data,
        }
    }

    fn branding_memo(&self, request: &LaunchRequest) -> Instruction {
        let memo = format!("{}:{}", self.memo_brand, request.symbol);
        Instruction {
            program_id: MEMO_PROGRAM_ID,
            accounts: vec![],
            data: memo.into_bytes(),
        }
    }

    /// Wrap instructions with the requester as fee payer and a blockhash
    /// fetched now.
    async fn wrap(
        &self,
        instructions: &[Instruction],
        fee_payer: &Pubkey,
    ) -> Result<Transaction, LaunchError> {
        let blockhash = self
            .chain
            .latest_blockhash()
            .await
            .map_err(|e| LaunchError::ChainSubmission {
                step: "blockhash".to_string(),
                reason: e.to_string(),
            })?;
        let message = Message::new_with_blockhash(instructions, Some(fee_payer), &blockhash);
        Ok(Transaction::new_unsigned(message))
    }
}
