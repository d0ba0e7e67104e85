use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        RwLock, RwLockReadGuard, RwLockWriteGuard,
    },
};

use async_trait::async_trait;
use error_stack::Result;
use ledger_primitives::{Block, Hash, Transaction};

use crate::{LedgerStore, StoreError};

/// A [LedgerStore] that keeps everything in memory.
///
/// Reads and writes can be made to fail to exercise error paths in tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    upserts: AtomicU64,
}

#[derive(Debug, Default)]
struct Inner {
    blocks: BTreeMap<u64, Block>,
    block_by_hash: HashMap<String, u64>,
    /// Transaction hash to (block number, position in block).
    transaction_by_hash: HashMap<String, (u64, usize)>,
}

impl MemoryStore {
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of successful upserts.
    pub fn upsert_count(&self) -> u64 {
        self.upserts.load(Ordering::SeqCst)
    }

    /// Returns the stored block numbers in ascending order.
    pub fn block_numbers(&self) -> Vec<u64> {
        self.read().blocks.keys().copied().collect()
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        match self.inner.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn check_read(&self) -> Result<(), StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Query.into());
        }
        Ok(())
    }
}

impl Inner {
    fn remove_block(&mut self, number: u64) {
        let Some(previous) = self.blocks.remove(&number) else {
            return;
        };

        self.block_by_hash.remove(&previous.hash);
        for tx in &previous.transactions {
            if let Some((owner, _)) = self.transaction_by_hash.get(&tx.hash) {
                if *owner == number {
                    self.transaction_by_hash.remove(&tx.hash);
                }
            }
        }
    }

    fn insert_block(&mut self, block: Block) {
        self.block_by_hash.insert(block.hash.clone(), block.number);
        for (position, tx) in block.transactions.iter().enumerate() {
            self.transaction_by_hash
                .insert(tx.hash.clone(), (block.number, position));
        }
        self.blocks.insert(block.number, block);
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn ensure_schema(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn upsert_block(&self, block: &Block) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Query.into());
        }

        let mut inner = self.write();
        inner.remove_block(block.number);
        inner.insert_block(block.clone());
        self.upserts.fetch_add(1, Ordering::SeqCst);

        Ok(())
    }

    async fn find_block_by_hash(&self, hash: &Hash) -> Result<Option<Block>, StoreError> {
        self.check_read()?;
        let inner = self.read();
        let block = inner
            .block_by_hash
            .get(hash.as_str())
            .and_then(|number| inner.blocks.get(number))
            .cloned();
        Ok(block)
    }

    async fn find_block_by_number(&self, number: u64) -> Result<Option<Block>, StoreError> {
        self.check_read()?;
        Ok(self.read().blocks.get(&number).cloned())
    }

    async fn find_latest_blocks(&self, limit: usize) -> Result<Vec<Block>, StoreError> {
        self.check_read()?;
        let blocks = self
            .read()
            .blocks
            .values()
            .rev()
            .take(limit)
            .cloned()
            .collect();
        Ok(blocks)
    }

    async fn find_transaction_by_hash(
        &self,
        hash: &Hash,
    ) -> Result<Option<Transaction>, StoreError> {
        self.check_read()?;
        let inner = self.read();
        let transaction = inner
            .transaction_by_hash
            .get(hash.as_str())
            .and_then(|(number, position)| {
                inner
                    .blocks
                    .get(number)
                    .and_then(|block| block.transactions.get(*position))
            })
            .cloned();
        Ok(transaction)
    }

    async fn latest_stored_number(&self) -> Result<Option<u64>, StoreError> {
        self.check_read()?;
        Ok(self.read().blocks.keys().next_back().copied())
    }
}
