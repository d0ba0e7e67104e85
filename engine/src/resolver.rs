use std::sync::Arc;

use error_stack::{Report, Result, ResultExt};
use ledger_chain::{ChainSource, ChainSourceError, ChainSourceErrorExt};
use ledger_observability::KeyValue;
use ledger_primitives::{Block, BlockId, BlockView, Hash, TransactionView};
use ledger_store::LedgerStore;
use tracing::{debug, instrument, warn};

use crate::{
    backfill::BackfillEngine,
    error::{BackfillError, ResolveError},
    metrics::EngineMetrics,
    worker::BackgroundHandle,
};

/// Number of blocks listed when the caller doesn't provide a valid limit.
pub const DEFAULT_LIST_LIMIT: usize = 20;
/// Upper bound on the number of blocks listed.
pub const MAX_LIST_LIMIT: usize = 1000;

/// Returns the number of blocks to list for the requested `limit`.
///
/// Missing and non-positive values fall back to [DEFAULT_LIST_LIMIT].
pub fn effective_limit(limit: Option<i64>) -> usize {
    match limit {
        Some(limit) if limit > 0 => (limit as u64).min(MAX_LIST_LIMIT as u64) as usize,
        _ => DEFAULT_LIST_LIMIT,
    }
}

/// Parses a block number or hash supplied by a client.
pub fn parse_block_id(input: &str) -> Result<BlockId, ResolveError> {
    input
        .parse::<BlockId>()
        .change_context(ResolveError::InvalidInput)
        .attach_printable_lazy(|| format!("invalid block identifier: {input}"))
}

/// Parses a transaction hash supplied by a client.
pub fn parse_transaction_hash(input: &str) -> Result<Hash, ResolveError> {
    input
        .parse::<Hash>()
        .change_context(ResolveError::InvalidInput)
        .attach_printable_lazy(|| format!("invalid transaction hash: {input}"))
}

/// Serves lookups from the store, falling back to the chain source on a miss.
pub struct Resolver<C, S> {
    chain: Arc<C>,
    store: Arc<S>,
    engine: Arc<BackfillEngine<C, S>>,
    background: BackgroundHandle,
    metrics: EngineMetrics,
}

impl<C, S> Resolver<C, S>
where
    C: ChainSource + 'static,
    S: LedgerStore + 'static,
{
    pub fn new(
        chain: Arc<C>,
        store: Arc<S>,
        engine: Arc<BackfillEngine<C, S>>,
        background: BackgroundHandle,
    ) -> Self {
        Self {
            chain,
            store,
            engine,
            background,
            metrics: EngineMetrics::default(),
        }
    }

    /// Returns the block with the given number or hash.
    ///
    /// On a store miss the block is fetched from the chain source and queued
    /// for storage without waiting for the write.
    #[instrument(skip(self), err(Debug))]
    pub async fn resolve_block(&self, id: &BlockId) -> Result<BlockView, ResolveError> {
        let stored = match id {
            BlockId::Number(number) => self.store.find_block_by_number(*number).await,
            BlockId::Hash(hash) => self.store.find_block_by_hash(hash).await,
        };

        match stored {
            Ok(Some(block)) => {
                self.record_lookup("block", "store");
                return Ok(BlockView::from(block));
            }
            Ok(None) => {}
            Err(err) => warn!(id = %id, err = ?err, "store lookup failed, using chain source"),
        }

        let block = match id {
            BlockId::Number(number) => self.chain.block_by_number(*number).await,
            BlockId::Hash(hash) => self.chain.block_by_hash(hash).await,
        }
        .map_err(map_chain_error)?;

        self.record_lookup("block", "chain");
        debug!(number = block.number, "block fetched from chain source");

        let view = BlockView::from(&block);
        self.background.write_back(block);
        Ok(view)
    }

    /// Returns the transaction with the given hash.
    ///
    /// Transactions fetched from the chain source are not written back: only
    /// whole blocks are stored.
    #[instrument(skip(self), err(Debug))]
    pub async fn resolve_transaction(
        &self,
        hash: &Hash,
    ) -> Result<TransactionView, ResolveError> {
        match self.store.find_transaction_by_hash(hash).await {
            Ok(Some(transaction)) => {
                self.record_lookup("transaction", "store");
                return Ok(TransactionView::from(transaction));
            }
            Ok(None) => {}
            Err(err) => {
                warn!(hash = %hash, err = ?err, "store lookup failed, using chain source")
            }
        }

        let transaction = self
            .chain
            .transaction_by_hash(hash)
            .await
            .map_err(map_chain_error)?;

        self.record_lookup("transaction", "chain");
        Ok(TransactionView::from(transaction))
    }

    /// Returns the most recent stored blocks, highest number first.
    ///
    /// Afterwards queues a backfill from the block after the highest stored
    /// one, or from the chain head if the store is empty.
    #[instrument(skip(self), err(Debug))]
    pub async fn list_recent_blocks(
        &self,
        limit: Option<i64>,
    ) -> Result<Vec<BlockView>, ResolveError> {
        let limit = effective_limit(limit);
        let blocks = self
            .store
            .find_latest_blocks(limit)
            .await
            .change_context(ResolveError::Store)
            .attach_printable("failed to list latest blocks")?;

        let start = blocks.first().map(|block: &Block| block.number + 1);
        self.background.backfill(start);

        Ok(blocks.into_iter().map(BlockView::from).collect())
    }

    /// Runs a backfill and waits for it to complete.
    ///
    /// Starts from the block after the latest stored one if `start` is `None`.
    pub async fn run_backfill(&self, start: Option<u64>) -> Result<u64, BackfillError> {
        let start = match start {
            Some(start) => start,
            None => self.engine.resolve_start().await?,
        };
        self.engine.run(start).await
    }

    /// Returns the latest stored block number and the chain head.
    pub async fn status(&self) -> Result<(Option<u64>, u64), ResolveError> {
        let latest = self
            .store
            .latest_stored_number()
            .await
            .change_context(ResolveError::Store)?;
        let head = self
            .chain
            .current_height()
            .await
            .map_err(map_chain_error)?;
        Ok((latest, head))
    }

    fn record_lookup(&self, kind: &'static str, source: &'static str) {
        self.metrics.lookups.add(
            1,
            &[KeyValue::new("kind", kind), KeyValue::new("source", source)],
        );
    }
}

fn map_chain_error(err: Report<ChainSourceError>) -> Report<ResolveError> {
    if err.is_not_found() {
        err.change_context(ResolveError::NotFound)
    } else {
        err.change_context(ResolveError::Unavailable)
    }
}
