mod connection;
mod pool;
mod schema;

use std::{collections::HashMap, str::FromStr, time::Duration};

use async_trait::async_trait;
use error_stack::{Result, ResultExt};
use ledger_primitives::{Block, Hash, Log, Transaction};
use tokio_postgres::{Client, Config, Row};
use tracing::{debug, info, instrument};

pub use self::connection::TlsConfiguration;
use self::{connection::Connector, pool::Pool};
use crate::{LedgerStore, StoreError};

const DEFAULT_POOL_SIZE: usize = 10;
const DEFAULT_CONNECT_ATTEMPTS: u32 = 5;
const DEFAULT_CONNECT_RETRY_DELAY: Duration = Duration::from_secs(3);

#[derive(Debug, Clone)]
pub struct PostgresStoreOptions {
    /// Connection string to the PostgreSQL server.
    pub connection_string: String,
    pub tls: TlsConfiguration,
    /// Number of connections in the pool.
    pub pool_size: usize,
    /// Connections older than this are replaced on checkout.
    pub max_connection_lifetime: Option<Duration>,
    /// Number of attempts to open the first connection.
    pub connect_attempts: u32,
    /// Delay before the first retry. Doubles after each attempt.
    pub connect_retry_delay: Duration,
}

impl PostgresStoreOptions {
    pub fn new(connection_string: impl Into<String>) -> Self {
        Self {
            connection_string: connection_string.into(),
            tls: TlsConfiguration::default(),
            pool_size: DEFAULT_POOL_SIZE,
            max_connection_lifetime: None,
            connect_attempts: DEFAULT_CONNECT_ATTEMPTS,
            connect_retry_delay: DEFAULT_CONNECT_RETRY_DELAY,
        }
    }
}

/// A [LedgerStore] backed by PostgreSQL.
pub struct PostgresStore {
    pool: Pool,
}

impl PostgresStore {
    pub async fn connect(options: PostgresStoreOptions) -> Result<Self, StoreError> {
        info!(pool_size = options.pool_size, "connecting to database");
        let config = Config::from_str(&options.connection_string)
            .change_context(StoreError::Configuration)
            .attach_printable("failed to build postgres config from connection string")?;

        let connector = Connector::new(config, &options.tls).await?;
        let client = connector
            .connect_with_retry(options.connect_attempts, options.connect_retry_delay)
            .await?;
        info!("client connected successfully");

        let pool = Pool::new(
            connector,
            options.pool_size,
            options.max_connection_lifetime,
            client,
        );

        Ok(Self { pool })
    }
}

#[async_trait]
impl LedgerStore for PostgresStore {
    async fn ensure_schema(&self) -> Result<(), StoreError> {
        let client = self.pool.get().await?;
        client
            .batch_execute(schema::CREATE_SCHEMA)
            .await
            .change_context(StoreError::Query)
            .attach_printable("failed to create schema")?;
        Ok(())
    }

    #[instrument(skip_all, fields(number = block.number), err(Debug))]
    async fn upsert_block(&self, block: &Block) -> Result<(), StoreError> {
        let mut client = self.pool.get().await?;
        let txn = client
            .transaction()
            .await
            .change_context(StoreError::Query)
            .attach_printable("failed to begin transaction")?;

        let number = to_i64(block.number)?;
        txn.execute(
            schema::UPSERT_BLOCK,
            &[
                &number,
                &block.hash,
                &to_i64(block.timestamp)?,
                &block.parent_hash,
            ],
        )
        .await
        .change_context(StoreError::Query)
        .attach_printable("failed to upsert block")?;

        let hashes = block.transaction_hashes();
        txn.execute(schema::DELETE_STALE_TRANSACTIONS, &[&number, &hashes])
            .await
            .change_context(StoreError::Query)
            .attach_printable("failed to delete stale transactions")?;

        for tx in &block.transactions {
            txn.execute(
                schema::UPSERT_TRANSACTION,
                &[
                    &tx.hash,
                    &number,
                    &to_i64(tx.transaction_index)?,
                    &tx.from,
                    &tx.to,
                    &to_i64(tx.nonce)?,
                    &tx.data,
                    &tx.value,
                ],
            )
            .await
            .change_context(StoreError::Query)
            .attach_printable_lazy(|| format!("failed to upsert transaction {}", tx.hash))?;

            for log in &tx.logs {
                txn.execute(
                    schema::UPSERT_LOG,
                    &[&tx.hash, &to_i64(log.index)?, &log.data],
                )
                .await
                .change_context(StoreError::Query)
                .attach_printable_lazy(|| format!("failed to upsert log of {}", tx.hash))?;
            }

            let log_count = to_i64(tx.logs.len() as u64)?;
            txn.execute(schema::DELETE_STALE_LOGS, &[&tx.hash, &log_count])
                .await
                .change_context(StoreError::Query)
                .attach_printable("failed to delete stale logs")?;
        }

        txn.commit()
            .await
            .change_context(StoreError::Query)
            .attach_printable("failed to commit block")?;

        debug!(transactions = block.transactions.len(), "block upserted");
        Ok(())
    }

    async fn find_block_by_hash(&self, hash: &Hash) -> Result<Option<Block>, StoreError> {
        let client = self.pool.get().await?;
        let rows = client
            .query(schema::SELECT_BLOCK_BY_HASH, &[&hash.as_str()])
            .await
            .change_context(StoreError::Query)
            .attach_printable("failed to query block by hash")?;
        let blocks = load_blocks(&client, rows).await?;
        Ok(blocks.into_iter().next())
    }

    async fn find_block_by_number(&self, number: u64) -> Result<Option<Block>, StoreError> {
        let client = self.pool.get().await?;
        let rows = client
            .query(schema::SELECT_BLOCK_BY_NUMBER, &[&to_i64(number)?])
            .await
            .change_context(StoreError::Query)
            .attach_printable("failed to query block by number")?;
        let blocks = load_blocks(&client, rows).await?;
        Ok(blocks.into_iter().next())
    }

    async fn find_latest_blocks(&self, limit: usize) -> Result<Vec<Block>, StoreError> {
        let client = self.pool.get().await?;
        let limit = to_i64(limit as u64)?;
        let rows = client
            .query(schema::SELECT_LATEST_BLOCKS, &[&limit])
            .await
            .change_context(StoreError::Query)
            .attach_printable("failed to query latest blocks")?;
        load_blocks(&client, rows).await
    }

    async fn find_transaction_by_hash(
        &self,
        hash: &Hash,
    ) -> Result<Option<Transaction>, StoreError> {
        let client = self.pool.get().await?;
        let Some(row) = client
            .query_opt(schema::SELECT_TRANSACTION_BY_HASH, &[&hash.as_str()])
            .await
            .change_context(StoreError::Query)
            .attach_printable("failed to query transaction by hash")?
        else {
            return Ok(None);
        };

        let mut transaction = decode_transaction(&row)?;
        let mut logs = load_logs(&client, vec![transaction.hash.clone()]).await?;
        transaction.logs = logs.remove(&transaction.hash).unwrap_or_default();
        Ok(Some(transaction))
    }

    async fn latest_stored_number(&self) -> Result<Option<u64>, StoreError> {
        let client = self.pool.get().await?;
        let row = client
            .query_one(schema::SELECT_LATEST_NUMBER, &[])
            .await
            .change_context(StoreError::Query)
            .attach_printable("failed to query latest block number")?;
        let number: Option<i64> = row.try_get(0).change_context(StoreError::Decode)?;
        number.map(to_u64).transpose()
    }
}

/// Decodes block rows and attaches their transactions and logs.
async fn load_blocks(client: &Client, rows: Vec<Row>) -> Result<Vec<Block>, StoreError> {
    let mut blocks = rows
        .iter()
        .map(decode_block)
        .collect::<Result<Vec<_>, _>>()?;
    if blocks.is_empty() {
        return Ok(blocks);
    }

    let numbers = blocks
        .iter()
        .map(|block| to_i64(block.number))
        .collect::<Result<Vec<_>, _>>()?;
    let rows = client
        .query(schema::SELECT_TRANSACTIONS_BY_BLOCKS, &[&numbers])
        .await
        .change_context(StoreError::Query)
        .attach_printable("failed to query transactions")?;
    let mut transactions = rows
        .iter()
        .map(decode_transaction)
        .collect::<Result<Vec<_>, _>>()?;

    let hashes = transactions.iter().map(|tx| tx.hash.clone()).collect();
    let mut logs = load_logs(client, hashes).await?;

    let mut by_block: HashMap<u64, Vec<Transaction>> = HashMap::new();
    for mut tx in transactions.drain(..) {
        tx.logs = logs.remove(&tx.hash).unwrap_or_default();
        by_block.entry(tx.block_number).or_default().push(tx);
    }

    for block in blocks.iter_mut() {
        block.transactions = by_block.remove(&block.number).unwrap_or_default();
    }

    Ok(blocks)
}

async fn load_logs(
    client: &Client,
    hashes: Vec<String>,
) -> Result<HashMap<String, Vec<Log>>, StoreError> {
    let mut logs: HashMap<String, Vec<Log>> = HashMap::new();
    if hashes.is_empty() {
        return Ok(logs);
    }

    let rows = client
        .query(schema::SELECT_LOGS_BY_TRANSACTIONS, &[&hashes])
        .await
        .change_context(StoreError::Query)
        .attach_printable("failed to query logs")?;

    for row in rows {
        let log = Log {
            transaction_hash: row.try_get(0).change_context(StoreError::Decode)?,
            index: to_u64(row.try_get(1).change_context(StoreError::Decode)?)?,
            data: row.try_get(2).change_context(StoreError::Decode)?,
        };
        logs.entry(log.transaction_hash.clone()).or_default().push(log);
    }

    Ok(logs)
}

fn decode_block(row: &Row) -> Result<Block, StoreError> {
    Ok(Block {
        number: to_u64(row.try_get(0).change_context(StoreError::Decode)?)?,
        hash: row.try_get(1).change_context(StoreError::Decode)?,
        timestamp: to_u64(row.try_get(2).change_context(StoreError::Decode)?)?,
        parent_hash: row.try_get(3).change_context(StoreError::Decode)?,
        transactions: Vec::new(),
    })
}

fn decode_transaction(row: &Row) -> Result<Transaction, StoreError> {
    Ok(Transaction {
        hash: row.try_get(0).change_context(StoreError::Decode)?,
        block_number: to_u64(row.try_get(1).change_context(StoreError::Decode)?)?,
        transaction_index: to_u64(row.try_get(2).change_context(StoreError::Decode)?)?,
        from: row.try_get(3).change_context(StoreError::Decode)?,
        to: row.try_get(4).change_context(StoreError::Decode)?,
        nonce: to_u64(row.try_get(5).change_context(StoreError::Decode)?)?,
        data: row.try_get(6).change_context(StoreError::Decode)?,
        value: row.try_get(7).change_context(StoreError::Decode)?,
        logs: Vec::new(),
    })
}

fn to_i64(value: u64) -> Result<i64, StoreError> {
    i64::try_from(value)
        .change_context(StoreError::Decode)
        .attach_printable_lazy(|| format!("value out of range: {value}"))
}

fn to_u64(value: i64) -> Result<u64, StoreError> {
    u64::try_from(value)
        .change_context(StoreError::Decode)
        .attach_printable_lazy(|| format!("negative value: {value}"))
}
