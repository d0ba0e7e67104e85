use std::{sync::Arc, time::Duration};

use error_stack::Result;
use ledger_chain::ChainSource;
use ledger_store::LedgerStore;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{backfill::BackfillEngine, error::BackfillError};

/// Runs a backfill from the latest stored block on a fixed interval.
pub struct PeriodicBackfill<C, S> {
    engine: Arc<BackfillEngine<C, S>>,
    interval: Duration,
}

impl<C, S> PeriodicBackfill<C, S>
where
    C: ChainSource + 'static,
    S: LedgerStore + 'static,
{
    pub fn new(engine: Arc<BackfillEngine<C, S>>, interval: Duration) -> Self {
        Self { engine, interval }
    }

    /// Runs until `ct` is cancelled.
    ///
    /// A failed run is logged and retried on the next tick. Ticks that fire
    /// while a run is in progress are skipped.
    pub async fn start(self, ct: CancellationToken) -> Result<(), BackfillError> {
        info!(interval = ?self.interval, "starting periodic backfill");

        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;

                _ = ct.cancelled() => break,

                _ = interval.tick() => {
                    tokio::select! {
                        _ = ct.cancelled() => break,
                        result = self.tick() => {
                            if let Err(err) = result {
                                warn!(err = ?err, "periodic backfill failed");
                            }
                        }
                    }
                }
            }
        }

        info!("periodic backfill stopped");
        Ok(())
    }

    async fn tick(&self) -> Result<u64, BackfillError> {
        let start = self.engine.resolve_start().await?;
        let reached = self.engine.run(start).await?;
        if reached >= start {
            info!(start, reached, "periodic backfill completed");
        } else {
            debug!(start, reached, "store is up to date");
        }
        Ok(reached)
    }
}
