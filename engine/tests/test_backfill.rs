use std::{sync::Arc, time::Duration};

use assert_matches::assert_matches;
use async_trait::async_trait;
use error_stack::Result;
use ledger_chain::{
    testing::{synthetic_block, MemoryChain},
    ChainSource, ChainSourceError,
};
use ledger_engine::{BackfillEngine, BackfillError, BackfillOptions, PeriodicBackfill};
use ledger_primitives::{Block, Hash, Transaction};
use ledger_store::{LedgerStore, MemoryStore};
use tokio_util::sync::CancellationToken;

mod common;
use crate::common::*;

#[tokio::test]
async fn test_backfill_is_complete() {
    let harness = Harness::new(55, 4);
    harness.seed(1, 50).await;

    let reached = harness.engine.run(51).await.unwrap();

    assert_eq!(reached, 55);
    assert_eq!(harness.store.block_numbers(), (1..=55).collect::<Vec<_>>());
    for number in 51..=55 {
        let stored = harness.store.find_block_by_number(number).await.unwrap();
        assert_eq!(stored, Some(synthetic_block(number)));
    }
}

#[tokio::test]
async fn test_backfill_start_after_head() {
    let harness = Harness::new(10, 4);

    let reached = harness.engine.run(20).await.unwrap();

    assert_eq!(reached, 10);
    assert_eq!(harness.chain.height_requests(), 1);
    assert_eq!(harness.chain.block_requests(), 0);
    assert!(harness.store.block_numbers().is_empty());
}

#[tokio::test]
async fn test_backfill_follows_moving_head() {
    let harness = Harness::new(20, 4);
    // The head moves after the first height query, while the backlog is indexed.
    harness.chain.advance_head_after(1, 7);

    let reached = harness.engine.run(11).await.unwrap();

    assert_eq!(reached, 27);
    assert_eq!(harness.store.block_numbers(), (11..=27).collect::<Vec<_>>());
    assert_eq!(harness.chain.height_requests(), 3);
}

#[tokio::test]
async fn test_backfill_fails_fast() {
    let harness = Harness::new(30, 4);
    harness.chain.fail_block(13);

    let err = harness.engine.run(1).await.unwrap_err();

    assert_matches!(err.current_context(), BackfillError::Block(13));
    let stored = harness.store.block_numbers();
    // Batches before the failing one (13..=16) are complete. Siblings of the
    // failing block may or may not be stored, later batches never are.
    for number in 1..=12 {
        assert!(stored.contains(&number), "block {number} missing");
    }
    assert!(!stored.contains(&13));
    assert!(stored.iter().all(|number| *number <= 16));
}

#[tokio::test]
async fn test_backfill_reports_lowest_failing_block() {
    let harness = Harness::new(10, 10);
    harness.chain.fail_block(7);
    harness.chain.fail_block(4);

    let err = harness.engine.run(1).await.unwrap_err();
    assert_matches!(err.current_context(), BackfillError::Block(4));
}

#[tokio::test]
async fn test_backfill_store_failure() {
    let harness = Harness::new(10, 2);
    harness.store.set_fail_writes(true);

    let err = harness.engine.run(9).await.unwrap_err();
    assert_matches!(err.current_context(), BackfillError::Block(9));
}

#[tokio::test]
async fn test_backfill_retry_is_idempotent() {
    let harness = Harness::new(55, 4);
    harness.seed(1, 50).await;

    harness.engine.run(51).await.unwrap();
    let first = harness.store.find_latest_blocks(100).await.unwrap();

    harness.engine.run(51).await.unwrap();
    let second = harness.store.find_latest_blocks(100).await.unwrap();

    assert_eq!(first, second);
}

#[tokio::test]
async fn test_worker_count_is_at_least_one() {
    let chain = Arc::new(MemoryChain::new(3));
    let store = Arc::new(MemoryStore::default());
    let engine = BackfillEngine::new(chain, store.clone(), BackfillOptions { worker_count: 0 });

    assert_eq!(engine.worker_count(), 1);
    assert_eq!(engine.run(1).await.unwrap(), 3);
    assert_eq!(store.block_numbers(), vec![1, 2, 3]);
}

#[tokio::test]
async fn test_resolve_start() {
    let harness = Harness::new(100, 4);
    // Empty store starts from the chain head.
    assert_eq!(harness.engine.resolve_start().await.unwrap(), 100);

    harness.seed(40, 42).await;
    assert_eq!(harness.engine.resolve_start().await.unwrap(), 43);

    harness.store.set_fail_reads(true);
    let err = harness.engine.resolve_start().await.unwrap_err();
    assert_matches!(err.current_context(), BackfillError::Store);
}

#[tokio::test]
async fn test_head_failure() {
    let harness = Harness::new(10, 4);
    let engine = BackfillEngine::new(
        Arc::new(FailingHead),
        harness.store.clone(),
        BackfillOptions::default(),
    );

    let err = engine.run(1).await.unwrap_err();
    assert_matches!(err.current_context(), BackfillError::Head);
}

#[tokio::test]
async fn test_periodic_backfill() {
    let harness = Harness::new(5, 4);
    let ct = CancellationToken::new();
    let periodic = PeriodicBackfill::new(harness.engine.clone(), Duration::from_millis(20));
    let handle = tokio::spawn(periodic.start(ct.clone()));

    // Empty store: indexing starts from the head.
    wait_until(|| harness.store.block_numbers() == vec![5]).await;

    harness.chain.set_head(8);
    wait_until(|| harness.store.block_numbers() == vec![5, 6, 7, 8]).await;

    ct.cancel();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_periodic_backfill_recovers_from_errors() {
    let harness = Harness::new(5, 4);
    harness.chain.fail_block(5);

    let ct = CancellationToken::new();
    let periodic = PeriodicBackfill::new(harness.engine.clone(), Duration::from_millis(20));
    let handle = tokio::spawn(periodic.start(ct.clone()));

    wait_until(|| harness.chain.block_requests() >= 2).await;
    assert!(harness.store.block_numbers().is_empty());

    ct.cancel();
    handle.await.unwrap().unwrap();
}

/// A chain source whose every request times out.
struct FailingHead;

#[async_trait]
impl ChainSource for FailingHead {
    async fn current_height(&self) -> Result<u64, ChainSourceError> {
        Err(ChainSourceError::Timeout.into())
    }

    async fn block_by_number(&self, _number: u64) -> Result<Block, ChainSourceError> {
        Err(ChainSourceError::Timeout.into())
    }

    async fn block_by_hash(&self, _hash: &Hash) -> Result<Block, ChainSourceError> {
        Err(ChainSourceError::Timeout.into())
    }

    async fn transaction_by_hash(&self, _hash: &Hash) -> Result<Transaction, ChainSourceError> {
        Err(ChainSourceError::Timeout.into())
    }
}
