//! Conversion from JSON-RPC responses to ledger records.
use std::collections::HashMap;

use alloy_consensus::Transaction as _;
use alloy_network::TransactionResponse;
use alloy_primitives::{hex, B256};
use alloy_rpc_types_eth::{
    Block as RpcBlock, BlockTransactions, Log as RpcLog, Transaction as RpcTransaction,
    TransactionReceipt,
};
use error_stack::{Result, ResultExt};
use ledger_primitives::{payload_to_hex, Block, Log, Transaction};

use crate::ChainSourceError;

/// Returns the hashes of the transactions included in the block, in block order.
pub fn transaction_hashes(block: &RpcBlock) -> Vec<B256> {
    block
        .transactions
        .as_transactions()
        .unwrap_or_default()
        .iter()
        .map(|tx| tx.tx_hash())
        .collect()
}

/// Converts the block, attaching to each transaction the logs found in `receipts`.
pub fn into_block(
    block: RpcBlock,
    receipts: Vec<TransactionReceipt>,
) -> Result<Block, ChainSourceError> {
    let number = block.header.number;
    let hash = hex::encode_prefixed(block.header.hash);
    let parent_hash = hex::encode_prefixed(block.header.parent_hash);
    let timestamp = block.header.timestamp;

    let transactions = match block.transactions {
        BlockTransactions::Full(transactions) => transactions,
        BlockTransactions::Hashes(hashes) if hashes.is_empty() => Vec::new(),
        _ => {
            return Err(ChainSourceError::Model)
                .attach_printable("block returned without full transactions")
                .attach_printable_lazy(|| format!("block number: {number}"));
        }
    };

    let mut receipts_by_hash: HashMap<B256, TransactionReceipt> = receipts
        .into_iter()
        .map(|receipt| (receipt.transaction_hash, receipt))
        .collect();

    let transactions = transactions
        .into_iter()
        .enumerate()
        .map(|(position, tx)| {
            let tx_hash = tx.tx_hash();
            let receipt = receipts_by_hash
                .remove(&tx_hash)
                .ok_or(ChainSourceError::Model)
                .attach_printable("missing receipt for transaction")
                .attach_printable_lazy(|| format!("transaction hash: {tx_hash}"))?;
            Ok(into_transaction(&tx, number, position as u64, &receipt))
        })
        .collect::<Result<Vec<_>, ChainSourceError>>()?;

    Ok(Block {
        number,
        hash,
        timestamp,
        parent_hash,
        transactions,
    })
}

/// Converts a transaction returned by `eth_getTransactionByHash`.
///
/// Pending transactions are not part of any block and are reported as not found.
pub fn into_included_transaction(
    tx: RpcTransaction,
    receipt: TransactionReceipt,
) -> Result<Transaction, ChainSourceError> {
    let (Some(block_number), Some(transaction_index)) = (tx.block_number, tx.transaction_index)
    else {
        return Err(ChainSourceError::NotFound)
            .attach_printable("transaction is pending")
            .attach_printable_lazy(|| format!("transaction hash: {}", tx.tx_hash()));
    };

    Ok(into_transaction(
        &tx,
        block_number,
        transaction_index,
        &receipt,
    ))
}

fn into_transaction(
    tx: &RpcTransaction,
    block_number: u64,
    transaction_index: u64,
    receipt: &TransactionReceipt,
) -> Transaction {
    let hash = hex::encode_prefixed(tx.tx_hash());
    let logs = receipt
        .inner
        .logs()
        .iter()
        .enumerate()
        .map(|(index, log)| into_log(&hash, index as u64, log))
        .collect();

    Transaction {
        block_number,
        transaction_index,
        hash,
        from: tx.from().to_checksum(None),
        to: tx.to().map(|to| to.to_checksum(None)),
        nonce: tx.nonce(),
        data: payload_to_hex(tx.input()),
        value: tx.value().to_string(),
        logs,
    }
}

fn into_log(transaction_hash: &str, index: u64, log: &RpcLog) -> Log {
    Log {
        transaction_hash: transaction_hash.to_string(),
        index,
        data: payload_to_hex(&log.data().data),
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! Node responses shaped like the ones returned by geth.
    use serde_json::{json, Value};

    pub const BLOCK_HASH: &str =
        "0xdc0818cf78f21a8e70579cb46a43643f78291264dda342ae31049421c82d21ae";
    pub const PARENT_HASH: &str =
        "0xe99e022112df268087ea7eafaf4790497fd21dbeeb6bd7a1721df161a6657a54";
    pub const TX_HASH: &str = "0x88df016429689c079f3b2f6ad39fa052532c56795b733da78a91ebe6a713944b";
    pub const FROM: &str = "0xa7d9ddbe1f17865597fbd27ec712455208b6b76d";
    pub const TO: &str = "0xf02c1c8e6114b1dbe8937a39260b5b0a374432bb";

    const ZERO_HASH: &str = "0x0000000000000000000000000000000000000000000000000000000000000000";

    fn empty_bloom() -> String {
        format!("0x{}", "0".repeat(512))
    }

    pub fn transaction(to: Option<&str>, input: &str, value: &str) -> Value {
        json!({
            "type": "0x0",
            "hash": TX_HASH,
            "blockHash": BLOCK_HASH,
            "blockNumber": "0x1b4",
            "transactionIndex": "0x0",
            "from": FROM,
            "to": to,
            "nonce": "0x15",
            "gas": "0xc350",
            "gasPrice": "0x4a817c800",
            "input": input,
            "value": value,
            "v": "0x1b",
            "r": "0x88ff6cf0fefd94db46111149ae4bfc179e9b94721fffd821d38d16464b3f71d0",
            "s": "0x45e0aff800961cfce805daef7016b9b675c137a6a41a548f7b60a3484c06a33a"
        })
    }

    pub fn block(transactions: Vec<Value>) -> Value {
        json!({
            "number": "0x1b4",
            "hash": BLOCK_HASH,
            "parentHash": PARENT_HASH,
            "sha3Uncles": "0x1dcc4de8dec75d7aab85b567b6ccd41ad312451b948a7413f0a142fd40d49347",
            "miner": "0x0000000000000000000000000000000000000000",
            "stateRoot": ZERO_HASH,
            "transactionsRoot": ZERO_HASH,
            "receiptsRoot": ZERO_HASH,
            "logsBloom": empty_bloom(),
            "difficulty": "0x4ea3f27bc",
            "gasLimit": "0x1388",
            "gasUsed": "0x0",
            "timestamp": "0x55ba467c",
            "extraData": "0x",
            "mixHash": ZERO_HASH,
            "nonce": "0x689056015818adbe",
            "size": "0x220",
            "uncles": [],
            "transactions": transactions
        })
    }

    pub fn log(index: u64, data: &str) -> Value {
        json!({
            "address": TO,
            "topics": [],
            "data": data,
            "blockHash": BLOCK_HASH,
            "blockNumber": "0x1b4",
            "transactionHash": TX_HASH,
            "transactionIndex": "0x0",
            "logIndex": format!("0x{index:x}"),
            "removed": false
        })
    }

    pub fn receipt(logs: Vec<Value>) -> Value {
        json!({
            "type": "0x0",
            "status": "0x1",
            "cumulativeGasUsed": "0x5208",
            "logs": logs,
            "logsBloom": empty_bloom(),
            "transactionHash": TX_HASH,
            "transactionIndex": "0x0",
            "blockHash": BLOCK_HASH,
            "blockNumber": "0x1b4",
            "gasUsed": "0x5208",
            "effectiveGasPrice": "0x4a817c800",
            "from": FROM,
            "to": TO,
            "contractAddress": null
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{fixtures::*, *};

    #[test]
    fn test_convert_block_with_logs() {
        let block: RpcBlock = serde_json::from_value(fixtures::block(vec![transaction(
            None,
            "0x",
            "0xde0b6b3a7640000",
        )]))
        .unwrap();
        let receipt: TransactionReceipt =
            serde_json::from_value(receipt(vec![log(0, "0x"), log(1, "0x0102")])).unwrap();

        assert_eq!(transaction_hashes(&block).len(), 1);

        let block = into_block(block, vec![receipt]).unwrap();
        assert_eq!(block.number, 436);
        assert_eq!(block.timestamp, 0x55ba467c);
        assert_eq!(block.hash, BLOCK_HASH);
        assert_eq!(block.parent_hash, PARENT_HASH);

        let tx = &block.transactions[0];
        assert_eq!(tx.hash, TX_HASH);
        assert_eq!(tx.block_number, 436);
        assert_eq!(tx.transaction_index, 0);
        assert_eq!(tx.nonce, 21);
        assert_eq!(tx.to, None);
        assert_eq!(tx.data, "");
        assert_eq!(tx.value, "1000000000000000000");
        assert!(tx.from.eq_ignore_ascii_case(FROM));

        assert_eq!(tx.logs.len(), 2);
        assert_eq!(tx.logs[0].index, 0);
        assert_eq!(tx.logs[0].data, "");
        assert_eq!(tx.logs[1].index, 1);
        assert_eq!(tx.logs[1].data, "0x0102");
        assert_eq!(tx.logs[1].transaction_hash, TX_HASH);
    }

    #[test]
    fn test_convert_empty_block() {
        let block: RpcBlock = serde_json::from_value(fixtures::block(Vec::new())).unwrap();
        assert!(transaction_hashes(&block).is_empty());

        let block = into_block(block, Vec::new()).unwrap();
        assert!(block.transactions.is_empty());
    }

    #[test]
    fn test_convert_block_missing_receipt() {
        let block: RpcBlock = serde_json::from_value(fixtures::block(vec![transaction(
            Some(TO),
            "0x",
            "0x0",
        )]))
        .unwrap();
        let err = into_block(block, Vec::new()).unwrap_err();
        assert_eq!(err.current_context(), &ChainSourceError::Model);
    }

    #[test]
    fn test_convert_block_with_hashes_only() {
        let mut block = fixtures::block(Vec::new());
        block["transactions"] = json!([TX_HASH]);
        let block: RpcBlock = serde_json::from_value(block).unwrap();

        let err = into_block(block, Vec::new()).unwrap_err();
        assert_eq!(err.current_context(), &ChainSourceError::Model);
    }

    #[test]
    fn test_pending_transaction_is_not_found() {
        let mut tx = transaction(Some(TO), "0x", "0x0");
        tx["blockHash"] = json!(null);
        tx["blockNumber"] = json!(null);
        tx["transactionIndex"] = json!(null);
        let tx: RpcTransaction = serde_json::from_value(tx).unwrap();
        let receipt: TransactionReceipt = serde_json::from_value(receipt(Vec::new())).unwrap();

        let err = into_included_transaction(tx, receipt).unwrap_err();
        assert_eq!(err.current_context(), &ChainSourceError::NotFound);
    }
}
