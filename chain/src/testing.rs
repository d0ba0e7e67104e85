//! In-memory chain source used by tests.
use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicU64, Ordering},
        Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use error_stack::{Result, ResultExt};
use ledger_primitives::{Block, Hash, Log, Transaction};

use crate::{ChainSource, ChainSourceError};

/// Number of transactions in each synthetic block.
pub const TRANSACTIONS_PER_BLOCK: u64 = 2;

/// Returns the hash of the synthetic block `number`.
pub fn block_hash(number: u64) -> String {
    format!("0xb{number:063x}")
}

/// Returns the hash of transaction `index` in the synthetic block `number`.
pub fn transaction_hash(number: u64, index: u64) -> String {
    format!("0xe{number:047x}{index:016x}")
}

/// Builds the synthetic block `number`.
pub fn synthetic_block(number: u64) -> Block {
    let transactions = (0..TRANSACTIONS_PER_BLOCK)
        .map(|index| synthetic_transaction(number, index))
        .collect();

    Block {
        number,
        hash: block_hash(number),
        timestamp: 1_600_000_000 + number * 12,
        parent_hash: block_hash(number.saturating_sub(1)),
        transactions,
    }
}

fn synthetic_transaction(number: u64, index: u64) -> Transaction {
    let hash = transaction_hash(number, index);
    Transaction {
        block_number: number,
        transaction_index: index,
        hash: hash.clone(),
        from: format!("0x{:040x}", number + 1),
        to: if index == 0 {
            None
        } else {
            Some(format!("0x{:040x}", index))
        },
        nonce: index,
        data: if index == 0 {
            String::new()
        } else {
            format!("0x{number:08x}")
        },
        value: format!("{}000000000000000000", number * 10 + index),
        logs: vec![Log {
            transaction_hash: hash,
            index: 0,
            data: format!("0x{index:02x}"),
        }],
    }
}

/// A chain whose blocks are generated from their number.
///
/// The head can be moved while a test runs and individual blocks can be
/// configured to fail.
#[derive(Debug, Default)]
pub struct MemoryChain {
    state: Mutex<State>,
    height_requests: AtomicU64,
    block_requests: AtomicU64,
    transaction_requests: AtomicU64,
}

#[derive(Debug, Default)]
struct State {
    head: u64,
    /// Move the head by `advance_by` once `advance_after` height queries were served.
    advance_after: Option<u64>,
    advance_by: u64,
    failing: HashSet<u64>,
    block_delay: Duration,
}

impl MemoryChain {
    pub fn new(head: u64) -> Self {
        Self {
            state: Mutex::new(State {
                head,
                ..State::default()
            }),
            ..Self::default()
        }
    }

    /// Advances the head by `by` blocks after `queries` height queries.
    pub fn advance_head_after(&self, queries: u64, by: u64) {
        let mut state = self.state();
        state.advance_after = Some(queries);
        state.advance_by = by;
    }

    pub fn set_head(&self, head: u64) {
        self.state().head = head;
    }

    pub fn head(&self) -> u64 {
        self.state().head
    }

    /// Makes every request for block `number` fail.
    pub fn fail_block(&self, number: u64) {
        self.state().failing.insert(number);
    }

    /// Delays every block response by `delay`.
    pub fn set_block_delay(&self, delay: Duration) {
        self.state().block_delay = delay;
    }

    pub fn height_requests(&self) -> u64 {
        self.height_requests.load(Ordering::SeqCst)
    }

    pub fn block_requests(&self) -> u64 {
        self.block_requests.load(Ordering::SeqCst)
    }

    pub fn transaction_requests(&self) -> u64 {
        self.transaction_requests.load(Ordering::SeqCst)
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn check_block(&self, number: u64) -> Result<(), ChainSourceError> {
        let state = self.state();
        if state.failing.contains(&number) {
            return Err(ChainSourceError::Request)
                .attach_printable_lazy(|| format!("block {number} is configured to fail"));
        }
        if number > state.head {
            return Err(ChainSourceError::NotFound)
                .attach_printable_lazy(|| format!("block not found: {number}"));
        }
        Ok(())
    }
}

/// Parses a synthetic block hash back into its number.
fn block_number_from_hash(hash: &Hash) -> Option<u64> {
    let digits = hash.as_str().strip_prefix("0xb")?;
    u64::from_str_radix(digits, 16).ok()
}

/// Parses a synthetic transaction hash back into its block number and index.
fn transaction_position_from_hash(hash: &Hash) -> Option<(u64, u64)> {
    let digits = hash.as_str().strip_prefix("0xe")?;
    let (number, index) = digits.split_at(47);
    let number = u64::from_str_radix(number, 16).ok()?;
    let index = u64::from_str_radix(index, 16).ok()?;
    Some((number, index))
}

#[async_trait]
impl ChainSource for MemoryChain {
    async fn current_height(&self) -> Result<u64, ChainSourceError> {
        let served = self.height_requests.fetch_add(1, Ordering::SeqCst) + 1;
        let mut state = self.state();
        if let Some(after) = state.advance_after {
            if served > after {
                state.head += state.advance_by;
                state.advance_after = None;
            }
        }
        Ok(state.head)
    }

    async fn block_by_number(&self, number: u64) -> Result<Block, ChainSourceError> {
        self.block_requests.fetch_add(1, Ordering::SeqCst);
        let delay = self.state().block_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.check_block(number)?;
        Ok(synthetic_block(number))
    }

    async fn block_by_hash(&self, hash: &Hash) -> Result<Block, ChainSourceError> {
        self.block_requests.fetch_add(1, Ordering::SeqCst);
        let number = block_number_from_hash(hash)
            .ok_or(ChainSourceError::NotFound)
            .attach_printable_lazy(|| format!("block not found: {hash}"))?;
        self.check_block(number)?;
        Ok(synthetic_block(number))
    }

    async fn transaction_by_hash(&self, hash: &Hash) -> Result<Transaction, ChainSourceError> {
        self.transaction_requests.fetch_add(1, Ordering::SeqCst);
        let (number, index) = transaction_position_from_hash(hash)
            .filter(|(_, index)| *index < TRANSACTIONS_PER_BLOCK)
            .ok_or(ChainSourceError::NotFound)
            .attach_printable_lazy(|| format!("transaction not found: {hash}"))?;
        self.check_block(number)?;
        Ok(synthetic_transaction(number, index))
    }
}
