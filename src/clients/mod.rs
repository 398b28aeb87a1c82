//! External collaborator clients.
//!
//! Each collaborator sits behind a small trait so the pipeline can be wired
//! against fakes in tests and against the real services in production. All
//! implementations attach a deadline to every remote call.

pub mod cache;
pub mod chain;
pub mod object_store;
pub mod signer;

pub use cache::{MokaCache, ReadCache};
pub use chain::{ChainClient, ChainError, SolanaRpc};
pub use object_store::{HttpObjectStore, ObjectStore, ObjectStoreError};
pub use signer::{HttpWalletSigner, SignerError, WalletSigner};
