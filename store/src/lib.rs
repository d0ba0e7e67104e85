//! Persistence of blocks, transactions and logs.
//!
//! The indexer talks to the store through the [LedgerStore] capability. Use
//! [PostgresStore] in production and [MemoryStore] when no database is
//! configured or in tests. [AnyStore] picks one of the two at startup.
mod error;
mod memory;
mod postgres;

use async_trait::async_trait;
use error_stack::Result;
use ledger_primitives::{Block, Hash, Transaction};

pub use self::error::StoreError;
pub use self::memory::MemoryStore;
pub use self::postgres::{PostgresStore, PostgresStoreOptions, TlsConfiguration};

/// Read and write access to indexed ledger data.
///
/// Lookups return `Ok(None)` when the record is not stored. Implementations
/// must be safe for concurrent use by many tasks.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Creates the tables and indices if they don't exist.
    async fn ensure_schema(&self) -> Result<(), StoreError>;

    /// Writes the block with its transactions and logs, replacing any block
    /// stored with the same number.
    async fn upsert_block(&self, block: &Block) -> Result<(), StoreError>;

    async fn find_block_by_hash(&self, hash: &Hash) -> Result<Option<Block>, StoreError>;

    async fn find_block_by_number(&self, number: u64) -> Result<Option<Block>, StoreError>;

    /// Returns up to `limit` blocks, highest number first.
    async fn find_latest_blocks(&self, limit: usize) -> Result<Vec<Block>, StoreError>;

    async fn find_transaction_by_hash(
        &self,
        hash: &Hash,
    ) -> Result<Option<Transaction>, StoreError>;

    /// Returns the highest stored block number, `None` if the store is empty.
    async fn latest_stored_number(&self) -> Result<Option<u64>, StoreError>;
}

/// A store selected from configuration.
pub enum AnyStore {
    Postgres(PostgresStore),
    Memory(MemoryStore),
}

impl AnyStore {
    /// Connects to PostgreSQL if options are given, otherwise keeps data in memory.
    pub async fn connect(options: Option<PostgresStoreOptions>) -> Result<Self, StoreError> {
        match options {
            Some(options) => {
                let store = PostgresStore::connect(options).await?;
                Ok(Self::Postgres(store))
            }
            None => Ok(Self::Memory(MemoryStore::default())),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Postgres(_) => "postgres",
            Self::Memory(_) => "memory",
        }
    }
}

#[async_trait]
impl LedgerStore for AnyStore {
    async fn ensure_schema(&self) -> Result<(), StoreError> {
        match self {
            Self::Postgres(inner) => inner.ensure_schema().await,
            Self::Memory(inner) => inner.ensure_schema().await,
        }
    }

    async fn upsert_block(&self, block: &Block) -> Result<(), StoreError> {
        match self {
            Self::Postgres(inner) => inner.upsert_block(block).await,
            Self::Memory(inner) => inner.upsert_block(block).await,
        }
    }

    async fn find_block_by_hash(&self, hash: &Hash) -> Result<Option<Block>, StoreError> {
        match self {
            Self::Postgres(inner) => inner.find_block_by_hash(hash).await,
            Self::Memory(inner) => inner.find_block_by_hash(hash).await,
        }
    }

    async fn find_block_by_number(&self, number: u64) -> Result<Option<Block>, StoreError> {
        match self {
            Self::Postgres(inner) => inner.find_block_by_number(number).await,
            Self::Memory(inner) => inner.find_block_by_number(number).await,
        }
    }

    async fn find_latest_blocks(&self, limit: usize) -> Result<Vec<Block>, StoreError> {
        match self {
            Self::Postgres(inner) => inner.find_latest_blocks(limit).await,
            Self::Memory(inner) => inner.find_latest_blocks(limit).await,
        }
    }

    async fn find_transaction_by_hash(
        &self,
        hash: &Hash,
    ) -> Result<Option<Transaction>, StoreError> {
        match self {
            Self::Postgres(inner) => inner.find_transaction_by_hash(hash).await,
            Self::Memory(inner) => inner.find_transaction_by_hash(hash).await,
        }
    }

    async fn latest_stored_number(&self) -> Result<Option<u64>, StoreError> {
        match self {
            Self::Postgres(inner) => inner.latest_stored_number().await,
            Self::Memory(inner) => inner.latest_stored_number().await,
        }
    }
}
