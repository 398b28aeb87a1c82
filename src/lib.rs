//! launchpipe - coin-launch orchestration for a bonding-curve launchpad.
//!
//! This crate is the saga-style coordinator behind "launch a coin": it
//! allocates a unique mint identity, assembles a shared fee configuration,
//! uploads off-chain assets, builds and executes the ordered transaction
//! sequence, persists durable records, and compensates partial failures.

pub mod clients;
pub mod config;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod retry;
pub mod storage;
pub mod types;

// Re-export the main surface for convenience
pub use config::{PersistOrdering, PipelineConfig};
pub use error::{LaunchError, StoreError};
pub use pipeline::LaunchPipeline;
pub use types::{LaunchRequest, LaunchResult};
