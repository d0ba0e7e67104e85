//! Access to the authoritative chain source.
//!
//! The indexer only depends on the [ChainSource] capability. [JsonRpcChainSource]
//! talks to an Ethereum-compatible JSON-RPC node, while [testing::MemoryChain]
//! serves synthetic blocks for tests.
mod error;
mod models;
mod provider;
pub mod testing;

use async_trait::async_trait;
use error_stack::Result;
use ledger_primitives::{Block, Hash, Transaction};

pub use self::error::{ChainSourceError, ChainSourceErrorExt};
pub use self::provider::{JsonRpcChainSource, JsonRpcOptions};

/// Read access to the chain source.
///
/// Implementations must be safe to share between concurrent tasks. Each call is
/// expected to enforce its own deadline.
#[async_trait]
pub trait ChainSource: Send + Sync {
    /// Returns the number of the most recent block.
    async fn current_height(&self) -> Result<u64, ChainSourceError>;

    /// Returns the block with the given number, including transactions and logs.
    async fn block_by_number(&self, number: u64) -> Result<Block, ChainSourceError>;

    /// Returns the block with the given hash, including transactions and logs.
    async fn block_by_hash(&self, hash: &Hash) -> Result<Block, ChainSourceError>;

    /// Returns an included transaction with its logs.
    async fn transaction_by_hash(&self, hash: &Hash) -> Result<Transaction, ChainSourceError>;
}

