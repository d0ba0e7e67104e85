use std::sync::Arc;

use error_stack::{Report, Result, ResultExt};
use ledger_chain::ChainSource;
use ledger_store::LedgerStore;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

use crate::{error::BackfillError, metrics::EngineMetrics};

const DEFAULT_WORKER_COUNT: usize = 10;

#[derive(Debug, Clone)]
pub struct BackfillOptions {
    /// Number of blocks indexed concurrently.
    pub worker_count: usize,
}

impl Default for BackfillOptions {
    fn default() -> Self {
        Self {
            worker_count: DEFAULT_WORKER_COUNT,
        }
    }
}

/// Indexes ranges of blocks from the chain source into the store.
pub struct BackfillEngine<C, S> {
    chain: Arc<C>,
    store: Arc<S>,
    worker_count: usize,
    metrics: EngineMetrics,
}

impl<C, S> BackfillEngine<C, S>
where
    C: ChainSource + 'static,
    S: LedgerStore + 'static,
{
    pub fn new(chain: Arc<C>, store: Arc<S>, options: BackfillOptions) -> Self {
        Self {
            chain,
            store,
            worker_count: options.worker_count.max(1),
            metrics: EngineMetrics::default(),
        }
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Returns the first block number a backfill should start from.
    ///
    /// This is the block after the latest stored one. If the store is empty,
    /// indexing starts from the current chain head, not from genesis.
    pub async fn resolve_start(&self) -> Result<u64, BackfillError> {
        let latest = self
            .store
            .latest_stored_number()
            .await
            .change_context(BackfillError::Store)
            .attach_printable("failed to read latest stored block")?;

        match latest {
            Some(number) => Ok(number + 1),
            None => self.current_height().await,
        }
    }

    /// Indexes every block from `start` up to the chain head, following the
    /// head while it moves.
    ///
    /// Blocks are indexed in batches of `worker_count`. A batch with a failed
    /// block aborts the run once all its tasks have finished. Other blocks of
    /// that batch may already be stored. Returns the last head observed.
    #[instrument(skip(self), err(Debug))]
    pub async fn run(&self, start: u64) -> Result<u64, BackfillError> {
        let result = self.run_inner(start).await;
        if result.is_err() {
            self.metrics.backfill_errors.add(1, &[]);
        }
        result
    }

    async fn run_inner(&self, start: u64) -> Result<u64, BackfillError> {
        let mut target = self.current_height().await?;
        let mut cursor = start;

        if cursor <= target {
            info!(start, target, "starting backfill");
        }

        while cursor <= target {
            let batch_end = target.min(cursor.saturating_add(self.worker_count as u64 - 1));
            self.index_batch(cursor, batch_end).await?;
            self.metrics.indexed.record(batch_end, &[]);
            cursor = batch_end + 1;

            if cursor > target {
                let height = self.current_height().await?;
                if height > target {
                    debug!(old = target, new = height, "chain head moved during backfill");
                    target = height;
                }
            }
        }

        Ok(target)
    }

    /// Indexes blocks `first..=last` concurrently and waits for all of them.
    async fn index_batch(&self, first: u64, last: u64) -> Result<(), BackfillError> {
        debug!(first, last, "indexing batch");

        let mut tasks = JoinSet::new();
        for number in first..=last {
            let chain = self.chain.clone();
            let store = self.store.clone();
            let metrics = self.metrics.clone();
            tasks.spawn(async move {
                let result = index_block(chain.as_ref(), store.as_ref(), number).await;
                if result.is_ok() {
                    metrics.blocks_indexed.add(1, &[]);
                }
                result
            });
        }

        // Keep the failure with the lowest block number.
        let mut failure: Option<Report<BackfillError>> = None;
        while let Some(joined) = tasks.join_next().await {
            let result = match joined {
                Ok(result) => result,
                Err(err) => Err(err)
                    .change_context(BackfillError::Block(first))
                    .attach_printable("backfill worker task failed")
                    .attach_printable_lazy(|| format!("batch: {first}..={last}")),
            };

            let Err(err) = result else {
                continue;
            };

            failure = match failure {
                Some(current) if block_of(&current) <= block_of(&err) => Some(current),
                _ => Some(err),
            };
        }

        match failure {
            Some(err) => {
                warn!(first, last, "batch failed");
                Err(err)
            }
            None => Ok(()),
        }
    }

    async fn current_height(&self) -> Result<u64, BackfillError> {
        let height = self
            .chain
            .current_height()
            .await
            .change_context(BackfillError::Head)?;
        self.metrics.head.record(height, &[]);
        Ok(height)
    }
}

async fn index_block<C, S>(chain: &C, store: &S, number: u64) -> Result<(), BackfillError>
where
    C: ChainSource + ?Sized,
    S: LedgerStore + ?Sized,
{
    let block = chain
        .block_by_number(number)
        .await
        .change_context(BackfillError::Block(number))
        .attach_printable("failed to fetch block")?;

    store
        .upsert_block(&block)
        .await
        .change_context(BackfillError::Block(number))
        .attach_printable("failed to store block")?;

    Ok(())
}

fn block_of(err: &Report<BackfillError>) -> u64 {
    match err.current_context() {
        BackfillError::Block(number) => *number,
        _ => u64::MAX,
    }
}
