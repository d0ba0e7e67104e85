pub const CREATE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS blocks (
    number BIGINT PRIMARY KEY,
    hash TEXT NOT NULL UNIQUE,
    timestamp BIGINT NOT NULL,
    parent_hash TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS transactions (
    hash TEXT PRIMARY KEY,
    block_number BIGINT NOT NULL REFERENCES blocks (number) ON DELETE CASCADE,
    transaction_index BIGINT NOT NULL,
    from_address TEXT NOT NULL,
    to_address TEXT,
    nonce BIGINT NOT NULL,
    data TEXT NOT NULL,
    value TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS transactions_block_number_idx
    ON transactions (block_number, transaction_index);

CREATE TABLE IF NOT EXISTS logs (
    transaction_hash TEXT NOT NULL REFERENCES transactions (hash) ON DELETE CASCADE,
    log_index BIGINT NOT NULL,
    data TEXT NOT NULL,
    PRIMARY KEY (transaction_hash, log_index)
);
"#;

pub const UPSERT_BLOCK: &str = r#"
INSERT INTO blocks (number, hash, timestamp, parent_hash)
VALUES ($1, $2, $3, $4)
ON CONFLICT (number) DO UPDATE SET
    hash = EXCLUDED.hash,
    timestamp = EXCLUDED.timestamp,
    parent_hash = EXCLUDED.parent_hash
"#;

pub const UPSERT_TRANSACTION: &str = r#"
INSERT INTO transactions (hash, block_number, transaction_index, from_address, to_address, nonce, data, value)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
ON CONFLICT (hash) DO UPDATE SET
    block_number = EXCLUDED.block_number,
    transaction_index = EXCLUDED.transaction_index,
    from_address = EXCLUDED.from_address,
    to_address = EXCLUDED.to_address,
    nonce = EXCLUDED.nonce,
    data = EXCLUDED.data,
    value = EXCLUDED.value
"#;

pub const UPSERT_LOG: &str = r#"
INSERT INTO logs (transaction_hash, log_index, data)
VALUES ($1, $2, $3)
ON CONFLICT (transaction_hash, log_index) DO UPDATE SET
    data = EXCLUDED.data
"#;

/// Removes transactions of a block that are not in the new transaction list.
pub const DELETE_STALE_TRANSACTIONS: &str =
    "DELETE FROM transactions WHERE block_number = $1 AND NOT (hash = ANY($2))";

/// Removes logs past the end of the new log list.
pub const DELETE_STALE_LOGS: &str =
    "DELETE FROM logs WHERE transaction_hash = $1 AND log_index >= $2";

pub const SELECT_BLOCK_BY_HASH: &str =
    "SELECT number, hash, timestamp, parent_hash FROM blocks WHERE hash = $1";

pub const SELECT_BLOCK_BY_NUMBER: &str =
    "SELECT number, hash, timestamp, parent_hash FROM blocks WHERE number = $1";

pub const SELECT_LATEST_BLOCKS: &str =
    "SELECT number, hash, timestamp, parent_hash FROM blocks ORDER BY number DESC LIMIT $1";

pub const SELECT_TRANSACTIONS_BY_BLOCKS: &str = r#"
SELECT hash, block_number, transaction_index, from_address, to_address, nonce, data, value
FROM transactions
WHERE block_number = ANY($1)
ORDER BY block_number, transaction_index
"#;

pub const SELECT_TRANSACTION_BY_HASH: &str = r#"
SELECT hash, block_number, transaction_index, from_address, to_address, nonce, data, value
FROM transactions
WHERE hash = $1
"#;

pub const SELECT_LOGS_BY_TRANSACTIONS: &str = r#"
SELECT transaction_hash, log_index, data
FROM logs
WHERE transaction_hash = ANY($1)
ORDER BY transaction_hash, log_index
"#;

pub const SELECT_LATEST_NUMBER: &str = "SELECT MAX(number) FROM blocks";
