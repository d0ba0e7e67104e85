//! Response shapes returned to callers of the read path.
use serde::{Deserialize, Serialize};

use crate::{Block, Log, Transaction};

/// A block with its transactions replaced by their hashes.
///
/// Callers fetch transaction details separately.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockView {
    pub block_num: u64,
    pub block_hash: String,
    pub block_time: u64,
    pub parent_hash: String,
    pub transactions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionView {
    pub tx_hash: String,
    pub from: String,
    pub to: Option<String>,
    pub nonce: u64,
    pub data: String,
    pub value: String,
    pub logs: Vec<LogView>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogView {
    pub index: u64,
    pub data: String,
}

impl From<&Block> for BlockView {
    fn from(block: &Block) -> Self {
        Self {
            block_num: block.number,
            block_hash: block.hash.clone(),
            block_time: block.timestamp,
            parent_hash: block.parent_hash.clone(),
            transactions: block.transaction_hashes(),
        }
    }
}

impl From<Block> for BlockView {
    fn from(block: Block) -> Self {
        let transactions = block.transaction_hashes();
        Self {
            block_num: block.number,
            block_hash: block.hash,
            block_time: block.timestamp,
            parent_hash: block.parent_hash,
            transactions,
        }
    }
}

impl From<Transaction> for TransactionView {
    fn from(tx: Transaction) -> Self {
        Self {
            tx_hash: tx.hash,
            from: tx.from,
            to: tx.to,
            nonce: tx.nonce,
            data: tx.data,
            value: tx.value,
            logs: tx.logs.into_iter().map(LogView::from).collect(),
        }
    }
}

impl From<Log> for LogView {
    fn from(log: Log) -> Self {
        Self {
            index: log.index,
            data: log.data,
        }
    }
}
