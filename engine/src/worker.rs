use std::sync::Arc;

use error_stack::Result;
use ledger_chain::ChainSource;
use ledger_primitives::Block;
use ledger_store::LedgerStore;
use tokio::sync::{
    mpsc::{self, error::TrySendError},
    Semaphore,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{backfill::BackfillEngine, error::BackfillError};

const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Work done off the request path.
#[derive(Debug)]
pub enum BackgroundJob {
    /// Store a block fetched from the chain source.
    WriteBack(Block),
    /// Run a backfill from the given block, or from the resolved start if `None`.
    Backfill { start: Option<u64> },
}

/// Sends jobs to the [BackgroundWorker] without waiting.
#[derive(Debug, Clone)]
pub struct BackgroundHandle {
    tx: mpsc::Sender<BackgroundJob>,
}

/// Consumes background jobs.
///
/// Write-backs run one at a time in the worker loop. Backfills run in their own
/// task, at most one at a time, and stop when the worker is cancelled.
pub struct BackgroundWorker<C, S> {
    rx: mpsc::Receiver<BackgroundJob>,
    store: Arc<S>,
    engine: Arc<BackfillEngine<C, S>>,
    backfill_permit: Arc<Semaphore>,
}

impl BackgroundHandle {
    /// Queues a job. Drops it with a warning if the queue is full or closed.
    pub fn send(&self, job: BackgroundJob) -> bool {
        match self.tx.try_send(job) {
            Ok(_) => true,
            Err(TrySendError::Full(job)) => {
                warn!(job = job.kind(), "background queue is full, dropping job");
                false
            }
            Err(TrySendError::Closed(job)) => {
                warn!(job = job.kind(), "background worker stopped, dropping job");
                false
            }
        }
    }

    pub fn write_back(&self, block: Block) -> bool {
        self.send(BackgroundJob::WriteBack(block))
    }

    pub fn backfill(&self, start: Option<u64>) -> bool {
        self.send(BackgroundJob::Backfill { start })
    }
}

impl BackgroundJob {
    fn kind(&self) -> &'static str {
        match self {
            BackgroundJob::WriteBack(_) => "write_back",
            BackgroundJob::Backfill { .. } => "backfill",
        }
    }
}

impl<C, S> BackgroundWorker<C, S>
where
    C: ChainSource + 'static,
    S: LedgerStore + 'static,
{
    pub fn new(
        store: Arc<S>,
        engine: Arc<BackfillEngine<C, S>>,
        capacity: Option<usize>,
    ) -> (Self, BackgroundHandle) {
        let capacity = capacity.unwrap_or(DEFAULT_CHANNEL_CAPACITY).max(1);
        let (tx, rx) = mpsc::channel(capacity);
        let worker = Self {
            rx,
            store,
            engine,
            backfill_permit: Arc::new(Semaphore::new(1)),
        };
        (worker, BackgroundHandle { tx })
    }

    /// Processes jobs until `ct` is cancelled or every handle is dropped.
    pub async fn start(mut self, ct: CancellationToken) -> Result<(), BackfillError> {
        info!("starting background worker");

        loop {
            tokio::select! {
                biased;

                _ = ct.cancelled() => break,

                job = self.rx.recv() => {
                    let Some(job) = job else {
                        break;
                    };
                    self.handle_job(job, &ct).await;
                }
            }
        }

        info!("background worker stopped");
        Ok(())
    }

    async fn handle_job(&self, job: BackgroundJob, ct: &CancellationToken) {
        match job {
            BackgroundJob::WriteBack(block) => {
                let number = block.number;
                match self.store.upsert_block(&block).await {
                    Ok(_) => debug!(number, "block written back"),
                    Err(err) => warn!(number, err = ?err, "failed to write back block"),
                }
            }
            BackgroundJob::Backfill { start } => {
                let Ok(permit) = self.backfill_permit.clone().try_acquire_owned() else {
                    debug!("backfill already running, skipping");
                    return;
                };

                let engine = self.engine.clone();
                let ct = ct.clone();
                tokio::spawn(async move {
                    let _permit = permit;
                    tokio::select! {
                        _ = ct.cancelled() => debug!("opportunistic backfill cancelled"),
                        _ = run_opportunistic_backfill(&engine, start) => {}
                    }
                });
            }
        }
    }
}

async fn run_opportunistic_backfill<C, S>(engine: &BackfillEngine<C, S>, start: Option<u64>)
where
    C: ChainSource + 'static,
    S: LedgerStore + 'static,
{
    let start = match start {
        Some(start) => start,
        None => match engine.resolve_start().await {
            Ok(start) => start,
            Err(err) => {
                warn!(err = ?err, "failed to resolve backfill start");
                return;
            }
        },
    };

    match engine.run(start).await {
        Ok(reached) => debug!(start, reached, "opportunistic backfill completed"),
        Err(err) => warn!(start, err = ?err, "opportunistic backfill failed"),
    }
}
