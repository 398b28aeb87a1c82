//! Core data model for the coin-launch pipeline.
//!
//! These are the request/result shapes callers see and the persisted records
//! the storage layer moves around. Runtime-only context types (mint identity,
//! creation context) live in the pipeline modules that own them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Fee schedule per tier, in basis points of each trade.
/// Tier strings are what callers send; unknown tiers are rejected at validation.
pub const FEE_SCHEDULE: &[(&str, u16)] = &[("1", 100), ("2", 200), ("3", 500)];

/// Look up the fee rate for a tier. `None` means the tier does not exist.
pub fn fee_bps_for_tier(tier: &str) -> Option<u16> {
    FEE_SCHEDULE
        .iter()
        .find(|(name, _)| *name == tier)
        .map(|(_, bps)| *bps)
}

/// Raw image payload attached to a launch request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImagePayload {
    pub bytes: Vec<u8>,
    /// File extension without the dot, e.g. "png".
    pub extension: String,
    pub content_type: String,
}

/// Bonding-curve economics for one launch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurveParams {
    /// Total token supply in whole tokens.
    pub total_supply: u64,
    /// Cumulative quote amount (lamports) at which the pool migrates off the curve.
    pub migration_threshold: u64,
    /// Fee tier key into [`FEE_SCHEDULE`].
    pub fee_tier: String,
    pub decimals: u8,
}

impl CurveParams {
    pub fn fee_bps(&self) -> Option<u16> {
        fee_bps_for_tier(&self.fee_tier)
    }
}

/// A coin-launch request as it arrives from the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaunchRequest {
    pub name: String,
    pub symbol: String,
    pub description: String,
    pub category: Option<String>,
    /// Custodial wallet id of the requester; fee payer on every transaction.
    pub wallet_id: String,
    /// Optional fee-share handle, e.g. "@someone". Normalized before lookup.
    pub beneficiary_handle: Option<String>,
    pub curve: CurveParams,
    pub image: ImagePayload,
    /// Lamports the creator spends on the first buy bundled into pool creation.
    pub first_buy_lamports: u64,
}

/// Caller-visible outcome of one launch run.
///
/// `partial_success` means the mint exists on-chain but the pipeline did not
/// fully complete; callers must not blindly retry creation with the same
/// parameters without checking for the existing mint first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaunchResult {
    pub success: bool,
    pub token_address: Option<String>,
    pub error: Option<String>,
    pub partial_success: bool,
    pub run_id: Uuid,
}

/// A platform user row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub user_id: i64,
    pub wallet_address: String,
    /// Custodial wallet id; the key the signer service knows the user by.
    pub wallet_id: String,
    pub coins_created: i64,
}

/// A shared curve-parameter config account row, keyed by (total_supply, fee_tier).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurveConfigRecord {
    pub config_address: String,
    pub total_supply: u64,
    pub fee_tier: String,
}

/// Lifecycle marker on a coin row. `Failed` is the degrade mark set when the
/// mint landed on-chain but the launch pipeline did not complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CoinStatus {
    Active,
    Failed,
}

impl CoinStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CoinStatus::Active => "active",
            CoinStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(CoinStatus::Active),
            "failed" => Some(CoinStatus::Failed),
            _ => None,
        }
    }
}

/// A launched coin row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoinRecord {
    pub coin_address: String,
    pub name: String,
    pub symbol: String,
    pub description: String,
    pub category: Option<String>,
    pub creator_id: i64,
    /// Wallet address of the fee-share beneficiary, when one was attached.
    pub tagged_wallet: Option<String>,
    pub fee_rate_bps: u16,
    /// Off-chain metadata JSON; the image URL lives inside it.
    pub metadata_uri: String,
    pub is_graduated: bool,
    pub status: CoinStatus,
    pub created_at: DateTime<Utc>,
}

/// Phase of a creation run. Progression is strictly monotonic; see
/// [`CreationStatus::rank`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CreationStatus {
    Pending,
    Validating,
    Allocating,
    Uploading,
    Persisting,
    ExecutingChain,
    Completed,
    /// Chain execution failed and nothing landed on-chain.
    ChainFailedClean,
    /// Chain execution failed after the mint became real on-chain.
    ChainFailedPartial,
    Failed,
}

impl CreationStatus {
    /// Ordering rank. A transition is legal only to a strictly higher rank.
    /// The two chain-failure statuses share a rank with `Completed`: a run
    /// reaches exactly one of the three and may only move on to `Failed`.
    pub fn rank(&self) -> u8 {
        match self {
            CreationStatus::Pending => 0,
            CreationStatus::Validating => 1,
            CreationStatus::Allocating => 2,
            CreationStatus::Uploading => 3,
            CreationStatus::Persisting => 4,
            CreationStatus::ExecutingChain => 5,
            CreationStatus::Completed
            | CreationStatus::ChainFailedClean
            | CreationStatus::ChainFailedPartial => 6,
            CreationStatus::Failed => 7,
        }
    }

    /// Terminal statuses freeze the run: no further status moves or step appends.
    pub fn is_terminal(&self) -> bool {
        matches!(self, CreationStatus::Completed | CreationStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CreationStatus::Pending => "pending",
            CreationStatus::Validating => "validating",
            CreationStatus::Allocating => "allocating",
            CreationStatus::Uploading => "uploading",
            CreationStatus::Persisting => "persisting",
            CreationStatus::ExecutingChain => "executing_chain",
            CreationStatus::Completed => "completed",
            CreationStatus::ChainFailedClean => "chain_failed_clean",
            CreationStatus::ChainFailedPartial => "chain_failed_partial",
            CreationStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(CreationStatus::Pending),
            "validating" => Some(CreationStatus::Validating),
            "allocating" => Some(CreationStatus::Allocating),
            "uploading" => Some(CreationStatus::Uploading),
            "persisting" => Some(CreationStatus::Persisting),
            "executing_chain" => Some(CreationStatus::ExecutingChain),
            "completed" => Some(CreationStatus::Completed),
            "chain_failed_clean" => Some(CreationStatus::ChainFailedClean),
            "chain_failed_partial" => Some(CreationStatus::ChainFailedPartial),
            "failed" => Some(CreationStatus::Failed),
            _ => None,
        }
    }
}

/// Persisted record of one creation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreationState {
    pub id: Uuid,
    pub status: CreationStatus,
    pub wallet_id: String,
    pub mint_address: Option<String>,
    pub config_address: Option<String>,
    pub metadata_url: Option<String>,
    pub image_url: Option<String>,
    pub error: Option<String>,
    /// Set when the run failed but the mint is real on-chain.
    pub partial: bool,
    pub completed_steps: Vec<String>,
    pub failed_steps: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Optional fields attached to a status update.
#[derive(Debug, Clone, Default)]
pub struct StatusFields {
    pub mint_address: Option<String>,
    pub config_address: Option<String>,
    pub metadata_url: Option<String>,
    pub image_url: Option<String>,
    pub error: Option<String>,
    pub partial: Option<bool>,
}
