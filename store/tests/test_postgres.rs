use std::time::Duration;

use assert_matches::assert_matches;
use ledger_primitives::{Block, Hash, Log, Transaction};
use ledger_store::{LedgerStore, PostgresStore, PostgresStoreOptions};
use testcontainers::{clients, core::WaitFor, GenericImage};

fn new_postgres_image() -> GenericImage {
    GenericImage::new("postgres", "15-alpine")
        .with_exposed_port(5432)
        .with_env_var("POSTGRES_DB", "postgres")
        .with_env_var("POSTGRES_HOST_AUTH_METHOD", "trust")
        .with_wait_for(WaitFor::message_on_stderr(
            "database system is ready to accept connections",
        ))
}

async fn new_store(port: u16) -> PostgresStore {
    let mut options =
        PostgresStoreOptions::new(format!("postgresql://postgres@localhost:{}", port));
    options.pool_size = 4;
    options.connect_retry_delay = Duration::from_millis(500);
    let store = PostgresStore::connect(options).await.unwrap();
    store.ensure_schema().await.unwrap();
    store
}

fn hash(prefix: char, n: u64) -> String {
    format!("0x{prefix}{n:063x}")
}

fn new_block(number: u64, tx_count: u64) -> Block {
    let transactions = (0..tx_count)
        .map(|i| {
            let tx_hash = hash('e', number * 100 + i);
            Transaction {
                block_number: number,
                transaction_index: i,
                hash: tx_hash.clone(),
                from: "0x000000000000000000000000000000000000dEaD".to_string(),
                to: if i == 0 {
                    None
                } else {
                    Some("0x0000000000000000000000000000000000000001".to_string())
                },
                nonce: i,
                data: if i == 0 { String::new() } else { "0x01".to_string() },
                value: "115792089237316195423570985008687907853269984665640564039457584007913129639935"
                    .to_string(),
                logs: (0..2)
                    .map(|index| Log {
                        transaction_hash: tx_hash.clone(),
                        index,
                        data: format!("0x{index:02x}"),
                    })
                    .collect(),
            }
        })
        .collect();

    Block {
        number,
        hash: hash('b', number),
        timestamp: 1_700_000_000 + number,
        parent_hash: hash('b', number.saturating_sub(1)),
        transactions,
    }
}

#[tokio::test]
#[ignore]
async fn test_upsert_and_find_block() {
    let docker = clients::Cli::default();
    let postgres = docker.run(new_postgres_image());
    let port = postgres.get_host_port_ipv4(5432);

    let store = new_store(port).await;
    // Schema creation is idempotent.
    store.ensure_schema().await.unwrap();

    let block = new_block(10, 3);
    store.upsert_block(&block).await.unwrap();

    let by_number = store.find_block_by_number(10).await.unwrap();
    assert_eq!(by_number.as_ref(), Some(&block));

    let block_hash = block.hash.parse::<Hash>().unwrap();
    let by_hash = store.find_block_by_hash(&block_hash).await.unwrap();
    assert_eq!(by_hash.as_ref(), Some(&block));

    let tx_hash = block.transactions[1].hash.parse::<Hash>().unwrap();
    let tx = store.find_transaction_by_hash(&tx_hash).await.unwrap();
    assert_eq!(tx.as_ref(), Some(&block.transactions[1]));

    let missing = hash('f', 1).parse::<Hash>().unwrap();
    assert_matches!(store.find_block_by_hash(&missing).await, Ok(None));
    assert_matches!(store.find_transaction_by_hash(&missing).await, Ok(None));
}

#[tokio::test]
#[ignore]
async fn test_upsert_is_idempotent() {
    let docker = clients::Cli::default();
    let postgres = docker.run(new_postgres_image());
    let port = postgres.get_host_port_ipv4(5432);

    let store = new_store(port).await;
    let block = new_block(1, 2);
    store.upsert_block(&block).await.unwrap();
    let first = store.find_latest_blocks(10).await.unwrap();

    store.upsert_block(&block).await.unwrap();
    let second = store.find_latest_blocks(10).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(second, vec![block]);
}

#[tokio::test]
#[ignore]
async fn test_upsert_replaces_stale_rows() {
    let docker = clients::Cli::default();
    let postgres = docker.run(new_postgres_image());
    let port = postgres.get_host_port_ipv4(5432);

    let store = new_store(port).await;
    let old = new_block(7, 3);
    store.upsert_block(&old).await.unwrap();

    let mut new = new_block(7, 1);
    new.transactions[0].logs.truncate(1);
    store.upsert_block(&new).await.unwrap();

    let stored = store.find_block_by_number(7).await.unwrap();
    assert_eq!(stored.as_ref(), Some(&new));

    let stale = old.transactions[2].hash.parse::<Hash>().unwrap();
    assert_matches!(store.find_transaction_by_hash(&stale).await, Ok(None));
}

#[tokio::test]
#[ignore]
async fn test_latest_blocks_and_number() {
    let docker = clients::Cli::default();
    let postgres = docker.run(new_postgres_image());
    let port = postgres.get_host_port_ipv4(5432);

    let store = new_store(port).await;
    assert_matches!(store.latest_stored_number().await, Ok(None));

    for number in [4, 2, 9, 0] {
        store.upsert_block(&new_block(number, 1)).await.unwrap();
    }

    assert_matches!(store.latest_stored_number().await, Ok(Some(9)));
    let numbers = store
        .find_latest_blocks(3)
        .await
        .unwrap()
        .into_iter()
        .map(|block| block.number)
        .collect::<Vec<_>>();
    assert_eq!(numbers, vec![9, 4, 2]);
}

#[tokio::test]
#[ignore]
async fn test_concurrent_upserts_share_pool() {
    let docker = clients::Cli::default();
    let postgres = docker.run(new_postgres_image());
    let port = postgres.get_host_port_ipv4(5432);

    let store = std::sync::Arc::new(new_store(port).await);
    let mut tasks = tokio::task::JoinSet::new();
    for number in 0..20 {
        let store = store.clone();
        tasks.spawn(async move { store.upsert_block(&new_block(number, 2)).await });
    }
    while let Some(result) = tasks.join_next().await {
        result.unwrap().unwrap();
    }

    let blocks = store.find_latest_blocks(100).await.unwrap();
    assert_eq!(blocks.len(), 20);
}
