use alloy_primitives::hex;

/// A block as observed on the chain source.
///
/// Blocks are immutable once finalized: writing the same block number twice
/// must produce identical records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    /// Block number, assigned by the chain source.
    pub number: u64,
    /// Block hash, `0x`-prefixed lowercase hex.
    pub hash: String,
    /// Unix timestamp in seconds.
    pub timestamp: u64,
    /// Hash of the parent block.
    pub parent_hash: String,
    /// Transactions, in block order.
    pub transactions: Vec<Transaction>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    /// Number of the block that includes the transaction.
    pub block_number: u64,
    /// Position of the transaction inside its block.
    pub transaction_index: u64,
    pub hash: String,
    /// Sender address.
    pub from: String,
    /// Recipient address, `None` for contract creation.
    pub to: Option<String>,
    pub nonce: u64,
    /// Input data as `0x`-prefixed hex, empty string if there is no input.
    pub data: String,
    /// Transferred amount in wei, base 10.
    pub value: String,
    /// Logs emitted by the transaction, in receipt order.
    pub logs: Vec<Log>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Log {
    pub transaction_hash: String,
    /// Position of the log inside the transaction receipt.
    pub index: u64,
    pub data: String,
}

impl Block {
    /// Returns the transaction hashes in block order.
    pub fn transaction_hashes(&self) -> Vec<String> {
        self.transactions.iter().map(|tx| tx.hash.clone()).collect()
    }
}

/// Renders raw bytes the way payloads are stored: `0x`-prefixed hex, or the
/// empty string when there are no bytes.
pub fn payload_to_hex(bytes: &[u8]) -> String {
    if bytes.is_empty() {
        return String::new();
    }

    hex::encode_prefixed(bytes)
}
