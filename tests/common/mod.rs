//! In-memory fakes of the pipeline's collaborator seams, shared by the
//! integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use launchpipe::clients::{
    ChainClient, ChainError, MokaCache, ObjectStore, ObjectStoreError, SignerError, WalletSigner,
};
use launchpipe::error::StoreError;
use launchpipe::pipeline::LaunchPipeline;
use launchpipe::retry::RetryPolicy;
use launchpipe::storage::{LaunchStore, PoolKeyClaim};
use launchpipe::types::{
    CoinRecord, CoinStatus, CreationState, CreationStatus, CurveConfigRecord, CurveParams,
    ImagePayload, LaunchRequest, StatusFields, UserRecord,
};
use launchpipe::PipelineConfig;
use solana_sdk::hash::Hash;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signature, Signer};
use solana_sdk::transaction::Transaction;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct KeyRow {
    id: i64,
    used: bool,
    private_key: String,
    public_key: String,
}

#[derive(Default)]
struct StoreInner {
    keys: Vec<KeyRow>,
    next_key_id: i64,
    configs: Vec<CurveConfigRecord>,
    coins: Vec<CoinRecord>,
    users: Vec<UserRecord>,
    next_user_id: i64,
    states: HashMap<Uuid, CreationState>,
    fail_next_coin_insert: bool,
}

/// Trait-faithful in-memory store. The mutex makes every operation atomic,
/// which is exactly the guarantee the skip-locked claim gives in Postgres.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<StoreInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn coin_count(&self) -> usize {
        self.inner.lock().unwrap().coins.len()
    }

    pub fn config_count(&self) -> usize {
        self.inner.lock().unwrap().configs.len()
    }

    pub fn consumed_key_count(&self) -> usize {
        self.inner.lock().unwrap().keys.iter().filter(|k| k.used).count()
    }

    /// Script the next coin insert to fail.
    pub fn fail_next_coin_insert(&self) {
        self.inner.lock().unwrap().fail_next_coin_insert = true;
    }
}

#[async_trait]
impl LaunchStore for MemoryStore {
    async fn claim_unused_key(&self) -> Result<Option<PoolKeyClaim>, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let row = inner.keys.iter_mut().find(|k| !k.used);
        Ok(row.map(|row| {
            row.used = true;
            PoolKeyClaim {
                id: row.id,
                private_key: row.private_key.clone(),
                public_key: row.public_key.clone(),
            }
        }))
    }

    async fn add_pool_key(&self, private_key: &str, public_key: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.next_key_id += 1;
        let id = inner.next_key_id;
        inner.keys.push(KeyRow {
            id,
            used: false,
            private_key: private_key.to_string(),
            public_key: public_key.to_string(),
        });
        Ok(())
    }

    async fn count_unused_keys(&self) -> Result<i64, StoreError> {
        Ok(self.inner.lock().unwrap().keys.iter().filter(|k| !k.used).count() as i64)
    }

    async fn find_config(
        &self,
        total_supply: u64,
        fee_tier: &str,
    ) -> Result<Option<CurveConfigRecord>, StoreError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .configs
            .iter()
            .find(|c| c.total_supply == total_supply && c.fee_tier == fee_tier)
            .cloned())
    }

    async fn get_or_create_config(
        &self,
        candidate: &CurveConfigRecord,
    ) -> Result<CurveConfigRecord, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(existing) = inner
            .configs
            .iter()
            .find(|c| c.total_supply == candidate.total_supply && c.fee_tier == candidate.fee_tier)
        {
            return Ok(existing.clone());
        }
        inner.configs.push(candidate.clone());
        Ok(candidate.clone())
    }

    async fn delete_config(&self, config_address: &str) -> Result<(), StoreError> {
        self.inner
            .lock()
            .unwrap()
            .configs
            .retain(|c| c.config_address != config_address);
        Ok(())
    }

    async fn insert_coin(&self, coin: &CoinRecord) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_next_coin_insert {
            inner.fail_next_coin_insert = false;
            return Err(StoreError::Corrupt {
                entity: "coins",
                reason: "scripted insert failure".to_string(),
            });
        }
        inner.coins.push(coin.clone());
        Ok(())
    }

    async fn find_coin(&self, coin_address: &str) -> Result<Option<CoinRecord>, StoreError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .coins
            .iter()
            .find(|c| c.coin_address == coin_address)
            .cloned())
    }

    async fn delete_coin(&self, coin_address: &str) -> Result<(), StoreError> {
        self.inner
            .lock()
            .unwrap()
            .coins
            .retain(|c| c.coin_address != coin_address);
        Ok(())
    }

    async fn mark_coin_failed(&self, coin_address: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(coin) = inner.coins.iter_mut().find(|c| c.coin_address == coin_address) {
            coin.status = CoinStatus::Failed;
        }
        Ok(())
    }

    async fn find_user_by_wallet_id(
        &self,
        wallet_id: &str,
    ) -> Result<Option<UserRecord>, StoreError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .users
            .iter()
            .find(|u| u.wallet_id == wallet_id)
            .cloned())
    }

    async fn create_user(
        &self,
        wallet_address: &str,
        wallet_id: &str,
    ) -> Result<UserRecord, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.next_user_id += 1;
        let user = UserRecord {
            user_id: inner.next_user_id,
            wallet_address: wallet_address.to_string(),
            wallet_id: wallet_id.to_string(),
            coins_created: 0,
        };
        inner.users.push(user.clone());
        Ok(user)
    }

    async fn get_or_create_user_by_handle(
        &self,
        normalized_handle: &str,
    ) -> Result<UserRecord, StoreError> {
        let surrogate = format!("handle:{normalized_handle}");
        let mut inner = self.inner.lock().unwrap();
        if let Some(existing) = inner.users.iter().find(|u| u.wallet_id == surrogate) {
            return Ok(existing.clone());
        }
        inner.next_user_id += 1;
        let user = UserRecord {
            user_id: inner.next_user_id,
            wallet_address: surrogate.clone(),
            wallet_id: surrogate,
            coins_created: 0,
        };
        inner.users.push(user.clone());
        Ok(user)
    }

    async fn adjust_coins_created(&self, user_id: i64, delta: i64) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        match inner.users.iter_mut().find(|u| u.user_id == user_id) {
            Some(user) => {
                user.coins_created += delta;
                Ok(())
            }
            None => Err(StoreError::NotFound {
                entity: "users",
                key: user_id.to_string(),
            }),
        }
    }

    async fn insert_creation_state(&self, state: &CreationState) -> Result<(), StoreError> {
        self.inner
            .lock()
            .unwrap()
            .states
            .insert(state.id, state.clone());
        Ok(())
    }

    async fn get_creation_state(&self, id: Uuid) -> Result<Option<CreationState>, StoreError> {
        Ok(self.inner.lock().unwrap().states.get(&id).cloned())
    }

    async fn update_creation_status(
        &self,
        id: Uuid,
        status: CreationStatus,
        fields: &StatusFields,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let state = inner.states.get_mut(&id).ok_or(StoreError::NotFound {
            entity: "coin_creation_states",
            key: id.to_string(),
        })?;
        state.status = status;
        if let Some(v) = &fields.mint_address {
            state.mint_address = Some(v.clone());
        }
        if let Some(v) = &fields.config_address {
            state.config_address = Some(v.clone());
        }
        if let Some(v) = &fields.metadata_url {
            state.metadata_url = Some(v.clone());
        }
        if let Some(v) = &fields.image_url {
            state.image_url = Some(v.clone());
        }
        if let Some(v) = &fields.error {
            state.error = Some(v.clone());
        }
        if let Some(v) = fields.partial {
            state.partial = v;
        }
        state.updated_at = chrono::Utc::now();
        Ok(())
    }

    async fn append_completed_step(&self, id: Uuid, step: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let state = inner.states.get_mut(&id).ok_or(StoreError::NotFound {
            entity: "coin_creation_states",
            key: id.to_string(),
        })?;
        state.completed_steps.push(step.to_string());
        Ok(())
    }

    async fn append_failed_step(&self, id: Uuid, step: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let state = inner.states.get_mut(&id).ok_or(StoreError::NotFound {
            entity: "coin_creation_states",
            key: id.to_string(),
        })?;
        state.failed_steps.push(step.to_string());
        Ok(())
    }

    async fn health_check(&self) -> Result<bool, StoreError> {
        Ok(true)
    }
}

// ---------------------------------------------------------------------------
// MockChain
// ---------------------------------------------------------------------------

#[derive(Default)]
struct ChainInner {
    existing: HashSet<Pubkey>,
    submissions: u64,
    successful_submissions: u64,
    /// Submissions that error before any succeed.
    fail_first: u64,
    /// Cap on total successful submissions; everything beyond errors.
    allow_successful: Option<u64>,
}

/// Scripted chain: submissions can be failed up front or capped, confirmation
/// always succeeds for whatever was accepted.
#[derive(Default)]
pub struct MockChain {
    inner: Mutex<ChainInner>,
}

impl MockChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Error out the first `n` submissions, then behave normally.
    pub fn fail_first_submissions(&self, n: u64) {
        self.inner.lock().unwrap().fail_first = n;
    }

    /// Accept at most `n` submissions; everything after errors.
    pub fn allow_successful_submissions(&self, n: u64) {
        self.inner.lock().unwrap().allow_successful = Some(n);
    }

    pub fn mark_existing(&self, address: Pubkey) {
        self.inner.lock().unwrap().existing.insert(address);
    }

    pub fn submission_count(&self) -> u64 {
        self.inner.lock().unwrap().submissions
    }
}

#[async_trait]
impl ChainClient for MockChain {
    async fn latest_blockhash(&self) -> Result<Hash, ChainError> {
        Ok(Hash::new_unique())
    }

    async fn submit_transaction(&self, _tx: &Transaction) -> Result<Signature, ChainError> {
        let mut inner = self.inner.lock().unwrap();
        inner.submissions += 1;
        if inner.fail_first > 0 {
            inner.fail_first -= 1;
            return Err(ChainError::Transport("scripted submit failure".into()));
        }
        if let Some(cap) = inner.allow_successful {
            if inner.successful_submissions >= cap {
                return Err(ChainError::Transport("scripted submit failure".into()));
            }
        }
        inner.successful_submissions += 1;
        let mut bytes = [0u8; 64];
        bytes[..8].copy_from_slice(&inner.submissions.to_le_bytes());
        Ok(Signature::from(bytes))
    }

    async fn confirm_signature(&self, _signature: &Signature) -> Result<(), ChainError> {
        Ok(())
    }

    async fn account_exists(&self, address: &Pubkey) -> Result<bool, ChainError> {
        Ok(self.inner.lock().unwrap().existing.contains(address))
    }
}

// ---------------------------------------------------------------------------
// MockSigner
// ---------------------------------------------------------------------------

/// Holds custodial keypairs by wallet id and co-signs like the real service.
#[derive(Default)]
pub struct MockSigner {
    wallets: Mutex<HashMap<String, Arc<Keypair>>>,
}

impl MockSigner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, wallet_id: &str, keypair: Arc<Keypair>) {
        self.wallets
            .lock()
            .unwrap()
            .insert(wallet_id.to_string(), keypair);
    }
}

#[async_trait]
impl WalletSigner for MockSigner {
    async fn sign_transaction(
        &self,
        wallet_id: &str,
        tx: &Transaction,
    ) -> Result<Transaction, SignerError> {
        let keypair = self
            .wallets
            .lock()
            .unwrap()
            .get(wallet_id)
            .cloned()
            .ok_or_else(|| SignerError::Rejected {
                wallet_id: wallet_id.to_string(),
                status: 404,
                body: "unknown wallet".to_string(),
            })?;

        let mut signed = tx.clone();
        let blockhash = signed.message.recent_blockhash;
        signed
            .try_partial_sign(&vec![keypair.as_ref()], blockhash)
            .map_err(|e| SignerError::Encoding(e.to_string()))?;
        Ok(signed)
    }
}

// ---------------------------------------------------------------------------
// MemoryObjectStore
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryObjectStore {
    objects: Mutex<HashMap<String, (Vec<u8>, String)>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn object_count(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.lock().unwrap().contains_key(key)
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, ObjectStoreError> {
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), (bytes, content_type.to_string()));
        Ok(self.public_url(key))
    }

    fn public_url(&self, key: &str) -> String {
        format!("mem://launch-assets/{key}")
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub const WALLET_ID: &str = "wallet-1";

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub chain: Arc<MockChain>,
    pub signer: Arc<MockSigner>,
    pub objects: Arc<MemoryObjectStore>,
    pub pipeline: LaunchPipeline,
    pub requester: UserRecord,
}

/// A wired pipeline over the in-memory fakes, with one registered requester
/// and fast retry timings.
pub async fn build_harness() -> Harness {
    build_harness_with_ordering(launchpipe::PersistOrdering::BeforeChain).await
}

pub async fn build_harness_with_ordering(ordering: launchpipe::PersistOrdering) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let chain = Arc::new(MockChain::new());
    let signer = Arc::new(MockSigner::new());
    let objects = Arc::new(MemoryObjectStore::new());
    let cache = Arc::new(MokaCache::new(1024, Duration::from_secs(1800)));

    let custodial = Arc::new(Keypair::new());
    let requester = store
        .create_user(&custodial.pubkey().to_string(), WALLET_ID)
        .await
        .unwrap();
    signer.register(WALLET_ID, custodial);

    let config = PipelineConfig {
        chain_retry: RetryPolicy {
            max_attempts: 3,
            base_delay_ms: 5,
            max_delay_ms: 10,
        },
        confirm_poll_interval_ms: 1,
        persist_ordering: ordering,
        ..PipelineConfig::default()
    };

    let pipeline = LaunchPipeline::new(
        store.clone(),
        cache,
        chain.clone(),
        signer.clone(),
        objects.clone(),
        Arc::new(Keypair::new()),
        Arc::new(Keypair::new()),
        config,
    )
    .unwrap();

    Harness {
        store,
        chain,
        signer,
        objects,
        pipeline,
        requester,
    }
}

/// Seed one vetted keypair into the pool, returning its address.
pub async fn seed_pool_key(store: &MemoryStore) -> Pubkey {
    let keypair = Keypair::new();
    let address = keypair.pubkey();
    store
        .add_pool_key(
            &bs58::encode(keypair.to_bytes()).into_string(),
            &address.to_string(),
        )
        .await
        .unwrap();
    address
}

pub fn launch_request(beneficiary: Option<&str>) -> LaunchRequest {
    LaunchRequest {
        name: "Integration Coin".to_string(),
        symbol: "ITC".to_string(),
        description: "coin launched by the integration tests".to_string(),
        category: Some("test".to_string()),
        wallet_id: WALLET_ID.to_string(),
        beneficiary_handle: beneficiary.map(str::to_string),
        curve: CurveParams {
            total_supply: 1_000_000_000,
            migration_threshold: 85_000_000_000,
            fee_tier: "1".to_string(),
            decimals: 6,
        },
        image: ImagePayload {
            bytes: vec![7u8; 64],
            extension: "png".to_string(),
            content_type: "image/png".to_string(),
        },
        first_buy_lamports: 1_000_000,
    }
}
