//! The coin-launch orchestration pipeline.
//!
//! Components in dependency order: the keypair pool allocates a mint
//! identity, the context builder freezes the run's inputs, assets are
//! published, records persisted, transactions forged and executed, with
//! compensation and state tracking wrapped around all of it.

pub mod assets;
pub mod compensation;
pub mod context;
pub mod executor;
pub mod forge;
pub mod keypair_pool;
pub mod orchestrator;
pub mod persistence;
pub mod tracker;

pub use assets::{AssetPublisher, PublishedAssets};
pub use compensation::{CompensationCoordinator, CompensationPlan};
pub use context::{normalize_handle, ContextBuilder, CreationContext, FeeConfig};
pub use executor::{ExecutionReport, StepReport, TransactionExecutor};
pub use forge::{StepName, StepState, TransactionForge, TransactionStep};
pub use keypair_pool::{KeypairPool, MintIdentity};
pub use orchestrator::LaunchPipeline;
pub use persistence::{PersistenceWriter, PersistReport};
pub use tracker::CreationStateTracker;
