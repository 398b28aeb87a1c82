//! Storage abstraction layer for the launch pipeline.
//!
//! [`LaunchStore`] is the formal contract for everything durable: the vetted
//! key pool, shared curve configs, coins, users, and creation-run states.
//! [`PgLaunchStore`] is the Postgres implementation; tests run against an
//! in-memory implementation of the same trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::StoreError;
use crate::types::{
    CoinRecord, CoinStatus, CreationState, CreationStatus, CurveConfigRecord, StatusFields,
    UserRecord,
};

/// A claimed row from the key pool. `private_key` is base58 key material;
/// decoding and verification happen in the pool allocator, not here.
#[derive(Debug, Clone)]
pub struct PoolKeyClaim {
    pub id: i64,
    pub private_key: String,
    pub public_key: String,
}

/// Formal contract for the pipeline's durable state.
#[async_trait]
pub trait LaunchStore: Send + Sync {
    /// Atomically claim one unused pool key, marking it used. Concurrent
    /// callers each get a different row or `None`; nobody blocks on a row
    /// someone else is claiming. A claimed row is never returned again.
    async fn claim_unused_key(&self) -> Result<Option<PoolKeyClaim>, StoreError>;

    /// Seed one key into the pool.
    async fn add_pool_key(&self, private_key: &str, public_key: &str) -> Result<(), StoreError>;

    async fn count_unused_keys(&self) -> Result<i64, StoreError>;

    async fn find_config(
        &self,
        total_supply: u64,
        fee_tier: &str,
    ) -> Result<Option<CurveConfigRecord>, StoreError>;

    /// Insert the config row unless one already exists for the same
    /// (total_supply, fee_tier); returns the row that won. Concurrent callers
    /// for the same key all observe the same address.
    async fn get_or_create_config(
        &self,
        candidate: &CurveConfigRecord,
    ) -> Result<CurveConfigRecord, StoreError>;

    async fn delete_config(&self, config_address: &str) -> Result<(), StoreError>;

    async fn insert_coin(&self, coin: &CoinRecord) -> Result<(), StoreError>;

    async fn find_coin(&self, coin_address: &str) -> Result<Option<CoinRecord>, StoreError>;

    async fn delete_coin(&self, coin_address: &str) -> Result<(), StoreError>;

    /// Degrade-mark a coin whose mint is real on-chain but whose launch did
    /// not complete.
    async fn mark_coin_failed(&self, coin_address: &str) -> Result<(), StoreError>;

    async fn find_user_by_wallet_id(
        &self,
        wallet_id: &str,
    ) -> Result<Option<UserRecord>, StoreError>;

    async fn create_user(
        &self,
        wallet_address: &str,
        wallet_id: &str,
    ) -> Result<UserRecord, StoreError>;

    /// Get-or-create a beneficiary row keyed by normalized handle. Unclaimed
    /// handles carry a `handle:` surrogate wallet until the owner claims it.
    async fn get_or_create_user_by_handle(
        &self,
        normalized_handle: &str,
    ) -> Result<UserRecord, StoreError>;

    /// Adjust a user's creation counter by `delta` (+1 on launch, -1 on
    /// compensation).
    async fn adjust_coins_created(&self, user_id: i64, delta: i64) -> Result<(), StoreError>;

    async fn insert_creation_state(&self, state: &CreationState) -> Result<(), StoreError>;

    async fn get_creation_state(&self, id: Uuid) -> Result<Option<CreationState>, StoreError>;

    async fn update_creation_status(
        &self,
        id: Uuid,
        status: CreationStatus,
        fields: &StatusFields,
    ) -> Result<(), StoreError>;

    async fn append_completed_step(&self, id: Uuid, step: &str) -> Result<(), StoreError>;

    async fn append_failed_step(&self, id: Uuid, step: &str) -> Result<(), StoreError>;

    async fn health_check(&self) -> Result<bool, StoreError>;
}

#[derive(FromRow)]
struct UserRow {
    user_id: i64,
    wallet_address: String,
    wallet_id: String,
    coins_created: i64,
}

impl From<UserRow> for UserRecord {
    fn from(row: UserRow) -> Self {
        UserRecord {
            user_id: row.user_id,
            wallet_address: row.wallet_address,
            wallet_id: row.wallet_id,
            coins_created: row.coins_created,
        }
    }
}

#[derive(FromRow)]
struct ConfigRow {
    config_address: String,
    total_supply: i64,
    fee_tier: String,
}

impl From<ConfigRow> for CurveConfigRecord {
    fn from(row: ConfigRow) -> Self {
        CurveConfigRecord {
            config_address: row.config_address,
            total_supply: row.total_supply as u64,
            fee_tier: row.fee_tier,
        }
    }
}

#[derive(FromRow)]
struct CoinRow {
    coin_address: String,
    name: String,
    symbol: String,
    description: String,
    category: Option<String>,
    creator_id: i64,
    tagged_wallet: Option<String>,
    fee_rate: i32,
    metadata_uri: String,
    is_graduated: bool,
    status: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<CoinRow> for CoinRecord {
    type Error = StoreError;

    fn try_from(row: CoinRow) -> Result<Self, StoreError> {
        let status = CoinStatus::parse(&row.status).ok_or_else(|| StoreError::Corrupt {
            entity: "coins",
            reason: format!("unknown status '{}'", row.status),
        })?;
        Ok(CoinRecord {
            coin_address: row.coin_address,
            name: row.name,
            symbol: row.symbol,
            description: row.description,
            category: row.category,
            creator_id: row.creator_id,
            tagged_wallet: row.tagged_wallet,
            fee_rate_bps: row.fee_rate as u16,
            metadata_uri: row.metadata_uri,
            is_graduated: row.is_graduated,
            status,
            created_at: row.created_at,
        })
    }
}

#[derive(FromRow)]
struct StateRow {
    id: Uuid,
    status: String,
    wallet_id: String,
    mint_address: Option<String>,
    config_address: Option<String>,
    metadata_url: Option<String>,
    image_url: Option<String>,
    error: Option<String>,
    partial: bool,
    completed_steps: Vec<String>,
    failed_steps: Vec<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<StateRow> for CreationState {
    type Error = StoreError;

    fn try_from(row: StateRow) -> Result<Self, StoreError> {
        let status = CreationStatus::parse(&row.status).ok_or_else(|| StoreError::Corrupt {
            entity: "coin_creation_states",
            reason: format!("unknown status '{}'", row.status),
        })?;
        Ok(CreationState {
            id: row.id,
            status,
            wallet_id: row.wallet_id,
            mint_address: row.mint_address,
            config_address: row.config_address,
            metadata_url: row.metadata_url,
            image_url: row.image_url,
            error: row.error,
            partial: row.partial,
            completed_steps: row.completed_steps,
            failed_steps: row.failed_steps,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Postgres implementation of [`LaunchStore`].
pub struct PgLaunchStore {
    pool: PgPool,
}

impl PgLaunchStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(std::time::Duration::from_secs(10))
            .connect(database_url)
            .await?;
        info!("connected to launch store");
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the schema if it does not exist yet.
    pub async fn init_schema(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS keys (
                id BIGSERIAL PRIMARY KEY,
                used BOOLEAN NOT NULL DEFAULT FALSE,
                private_key TEXT NOT NULL,
                public_key TEXT NOT NULL UNIQUE
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS configs (
                config_address TEXT PRIMARY KEY,
                total_supply BIGINT NOT NULL,
                fee_tier TEXT NOT NULL,
                UNIQUE (total_supply, fee_tier)
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                user_id BIGSERIAL PRIMARY KEY,
                wallet_address TEXT NOT NULL,
                wallet_id TEXT NOT NULL UNIQUE,
                coins_created BIGINT NOT NULL DEFAULT 0
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS coins (
                coin_address TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                symbol TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                category TEXT,
                creator_id BIGINT NOT NULL REFERENCES users(user_id),
                tagged_wallet TEXT,
                fee_rate INT NOT NULL,
                metadata_uri TEXT NOT NULL,
                is_graduated BOOLEAN NOT NULL DEFAULT FALSE,
                status TEXT NOT NULL DEFAULT 'active',
                created_at TIMESTAMPTZ NOT NULL DEFAULT now()
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS coin_creation_states (
                id UUID PRIMARY KEY,
                status TEXT NOT NULL,
                wallet_id TEXT NOT NULL,
                mint_address TEXT,
                config_address TEXT,
                metadata_url TEXT,
                image_url TEXT,
                error TEXT,
                partial BOOLEAN NOT NULL DEFAULT FALSE,
                completed_steps TEXT[] NOT NULL DEFAULT '{}',
                failed_steps TEXT[] NOT NULL DEFAULT '{}',
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        info!("launch store schema ready");
        Ok(())
    }
}

#[async_trait]
impl LaunchStore for PgLaunchStore {
    async fn claim_unused_key(&self) -> Result<Option<PoolKeyClaim>, StoreError> {
        // Single-statement claim: the subselect takes the row lock, SKIP
        // LOCKED keeps concurrent claimants off each other's rows.
        let row: Option<(i64, String, String)> = sqlx::query_as(
            r#"
            UPDATE keys SET used = TRUE
            WHERE id = (
                SELECT id FROM keys
                WHERE used = FALSE
                ORDER BY id
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING id, private_key, public_key
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(id, private_key, public_key)| {
            debug!(key_id = id, "claimed pool key");
            PoolKeyClaim {
                id,
                private_key,
                public_key,
            }
        }))
    }

    async fn add_pool_key(&self, private_key: &str, public_key: &str) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO keys (used, private_key, public_key) VALUES (FALSE, $1, $2)")
            .bind(private_key)
            .bind(public_key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn count_unused_keys(&self) -> Result<i64, StoreError> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM keys WHERE used = FALSE")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.0)
    }

    async fn find_config(
        &self,
        total_supply: u64,
        fee_tier: &str,
    ) -> Result<Option<CurveConfigRecord>, StoreError> {
        let row: Option<ConfigRow> = sqlx::query_as(
            "SELECT config_address, total_supply, fee_tier FROM configs \
             WHERE total_supply = $1 AND fee_tier = $2",
        )
        .bind(total_supply as i64)
        .bind(fee_tier)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn get_or_create_config(
        &self,
        candidate: &CurveConfigRecord,
    ) -> Result<CurveConfigRecord, StoreError> {
        sqlx::query(
            "INSERT INTO configs (config_address, total_supply, fee_tier) VALUES ($1, $2, $3) \
             ON CONFLICT (total_supply, fee_tier) DO NOTHING",
        )
        .bind(&candidate.config_address)
        .bind(candidate.total_supply as i64)
        .bind(&candidate.fee_tier)
        .execute(&self.pool)
        .await?;

        let row: ConfigRow = sqlx::query_as(
            "SELECT config_address, total_supply, fee_tier FROM configs \
             WHERE total_supply = $1 AND fee_tier = $2",
        )
        .bind(candidate.total_supply as i64)
        .bind(&candidate.fee_tier)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    async fn delete_config(&self, config_address: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM configs WHERE config_address = $1")
            .bind(config_address)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn insert_coin(&self, coin: &CoinRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO coins (
                coin_address, name, symbol, description, category, creator_id,
                tagged_wallet, fee_rate, metadata_uri, is_graduated, status, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(&coin.coin_address)
        .bind(&coin.name)
        .bind(&coin.symbol)
        .bind(&coin.description)
        .bind(&coin.category)
        .bind(coin.creator_id)
        .bind(&coin.tagged_wallet)
        .bind(coin.fee_rate_bps as i32)
        .bind(&coin.metadata_uri)
        .bind(coin.is_graduated)
        .bind(coin.status.as_str())
        .bind(coin.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_coin(&self, coin_address: &str) -> Result<Option<CoinRecord>, StoreError> {
        let row: Option<CoinRow> = sqlx::query_as(
            "SELECT coin_address, name, symbol, description, category, creator_id, \
             tagged_wallet, fee_rate, metadata_uri, is_graduated, status, created_at \
             FROM coins WHERE coin_address = $1",
        )
        .bind(coin_address)
        .fetch_optional(&self.pool)
        .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn delete_coin(&self, coin_address: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM coins WHERE coin_address = $1")
            .bind(coin_address)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn mark_coin_failed(&self, coin_address: &str) -> Result<(), StoreError> {
        sqlx::query("UPDATE coins SET status = 'failed' WHERE coin_address = $1")
            .bind(coin_address)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn find_user_by_wallet_id(
        &self,
        wallet_id: &str,
    ) -> Result<Option<UserRecord>, StoreError> {
        let row: Option<UserRow> = sqlx::query_as(
            "SELECT user_id, wallet_address, wallet_id, coins_created FROM users \
             WHERE wallet_id = $1",
        )
        .bind(wallet_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn create_user(
        &self,
        wallet_address: &str,
        wallet_id: &str,
    ) -> Result<UserRecord, StoreError> {
        let row: UserRow = sqlx::query_as(
            "INSERT INTO users (wallet_address, wallet_id) VALUES ($1, $2) \
             RETURNING user_id, wallet_address, wallet_id, coins_created",
        )
        .bind(wallet_address)
        .bind(wallet_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    async fn get_or_create_user_by_handle(
        &self,
        normalized_handle: &str,
    ) -> Result<UserRecord, StoreError> {
        let surrogate = format!("handle:{normalized_handle}");
        sqlx::query(
            "INSERT INTO users (wallet_address, wallet_id) VALUES ($1, $2) \
             ON CONFLICT (wallet_id) DO NOTHING",
        )
        .bind(&surrogate)
        .bind(&surrogate)
        .execute(&self.pool)
        .await?;

        let row: UserRow = sqlx::query_as(
            "SELECT user_id, wallet_address, wallet_id, coins_created FROM users \
             WHERE wallet_id = $1",
        )
        .bind(&surrogate)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    async fn adjust_coins_created(&self, user_id: i64, delta: i64) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE users SET coins_created = coins_created + $2 WHERE user_id = $1",
        )
        .bind(user_id)
        .bind(delta)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                entity: "users",
                key: user_id.to_string(),
            });
        }
        Ok(())
    }

    async fn insert_creation_state(&self, state: &CreationState) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO coin_creation_states (
                id, status, wallet_id, mint_address, config_address, metadata_url,
                image_url, error, partial, completed_steps, failed_steps,
                created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(state.id)
        .bind(state.status.as_str())
        .bind(&state.wallet_id)
        .bind(&state.mint_address)
        .bind(&state.config_address)
        .bind(&state.metadata_url)
        .bind(&state.image_url)
        .bind(&state.error)
        .bind(state.partial)
        .bind(&state.completed_steps)
        .bind(&state.failed_steps)
        .bind(state.created_at)
        .bind(state.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_creation_state(&self, id: Uuid) -> Result<Option<CreationState>, StoreError> {
        let row: Option<StateRow> = sqlx::query_as(
            "SELECT id, status, wallet_id, mint_address, config_address, metadata_url, \
             image_url, error, partial, completed_steps, failed_steps, created_at, updated_at \
             FROM coin_creation_states WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn update_creation_status(
        &self,
        id: Uuid,
        status: CreationStatus,
        fields: &StatusFields,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE coin_creation_states SET
                status = $2,
                mint_address = COALESCE($3, mint_address),
                config_address = COALESCE($4, config_address),
                metadata_url = COALESCE($5, metadata_url),
                image_url = COALESCE($6, image_url),
                error = COALESCE($7, error),
                partial = COALESCE($8, partial),
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(status.as_str())
        .bind(&fields.mint_address)
        .bind(&fields.config_address)
        .bind(&fields.metadata_url)
        .bind(&fields.image_url)
        .bind(&fields.error)
        .bind(fields.partial)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                entity: "coin_creation_states",
                key: id.to_string(),
            });
        }
        Ok(())
    }

    async fn append_completed_step(&self, id: Uuid, step: &str) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE coin_creation_states \
             SET completed_steps = array_append(completed_steps, $2), updated_at = now() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(step)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn append_failed_step(&self, id: Uuid, step: &str) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE coin_creation_states \
             SET failed_steps = array_append(failed_steps, $2), updated_at = now() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(step)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn health_check(&self) -> Result<bool, StoreError> {
        match sqlx::query("SELECT 1").execute(&self.pool).await {
            Ok(_) => Ok(true),
            Err(_) => Ok(false),
        }
    }
}
