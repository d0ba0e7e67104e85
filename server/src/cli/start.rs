use std::sync::Arc;

use clap::Args;
use error_stack::ResultExt;
use ledger_engine::{BackfillEngine, BackgroundWorker, PeriodicBackfill, Resolver};
use ledger_store::{AnyStore, LedgerStore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{
    cli::{backfill::BackfillArgs, rpc::RpcArgs, server::ServerArgs, store::StoreArgs},
    error::{LedgerError, Result},
    http::HttpServer,
};

#[derive(Args, Debug)]
pub struct StartCommand {
    #[clap(flatten)]
    rpc: RpcArgs,
    #[clap(flatten)]
    store: StoreArgs,
    #[clap(flatten)]
    backfill: BackfillArgs,
    #[clap(flatten)]
    server: ServerArgs,
}

#[derive(Args, Debug)]
pub struct BackfillCommand {
    #[clap(flatten)]
    rpc: RpcArgs,
    #[clap(flatten)]
    store: StoreArgs,
    #[clap(flatten)]
    backfill: BackfillArgs,
    /// First block to index.
    ///
    /// Defaults to the block after the latest stored one, or the chain head if
    /// the store is empty.
    #[arg(long = "from-block", env = "LEDGER_FROM_BLOCK")]
    from_block: Option<u64>,
}

impl StartCommand {
    pub async fn run(self, ct: CancellationToken) -> Result<()> {
        info!("starting ledger indexer");

        let address = self.server.to_socket_addr()?;
        let interval = self.backfill.interval()?;
        let chain = Arc::new(self.rpc.to_chain_source()?);
        let store = Arc::new(connect_store(&self.store).await?);

        let engine = Arc::new(BackfillEngine::new(
            chain.clone(),
            store.clone(),
            self.backfill.to_backfill_options(),
        ));

        let (worker, background) = BackgroundWorker::new(
            store.clone(),
            engine.clone(),
            Some(self.backfill.queue_size),
        );
        let periodic = PeriodicBackfill::new(engine.clone(), interval);
        let resolver = Arc::new(Resolver::new(chain, store, engine, background));
        let server = HttpServer::new(address, resolver);

        let mut tasks = JoinSet::new();

        tasks.spawn({
            let ct = ct.clone();
            async move {
                worker
                    .start(ct)
                    .await
                    .change_context(LedgerError::Backfill)
                    .attach_printable("background worker failed")
            }
        });

        tasks.spawn({
            let ct = ct.clone();
            async move {
                periodic
                    .start(ct)
                    .await
                    .change_context(LedgerError::Backfill)
                    .attach_printable("periodic backfill failed")
            }
        });

        tasks.spawn({
            let ct = ct.clone();
            async move { server.start(ct).await }
        });

        // The first task to stop brings down the others.
        let mut result = Ok(());
        while let Some(joined) = tasks.join_next().await {
            ct.cancel();

            let task_result = joined
                .change_context(LedgerError::Fatal)
                .attach_printable("task panicked")
                .and_then(|inner| inner);

            if let Err(err) = task_result {
                warn!(err = ?err, "task stopped with error");
                if result.is_ok() {
                    result = Err(err);
                }
            }
        }

        info!("ledger indexer stopped");
        result
    }
}

impl BackfillCommand {
    pub async fn run(self, ct: CancellationToken) -> Result<()> {
        let chain = Arc::new(self.rpc.to_chain_source()?);
        let store = Arc::new(connect_store(&self.store).await?);
        let engine = BackfillEngine::new(chain, store, self.backfill.to_backfill_options());

        let start = match self.from_block {
            Some(start) => start,
            None => engine
                .resolve_start()
                .await
                .change_context(LedgerError::Backfill)
                .attach_printable("failed to resolve backfill start")?,
        };

        info!(start, "starting one-shot backfill");

        tokio::select! {
            _ = ct.cancelled() => {
                info!("backfill interrupted");
                Ok(())
            }
            result = engine.run(start) => {
                let reached = result
                    .change_context(LedgerError::Backfill)
                    .attach_printable_lazy(|| format!("backfill from block {start} failed"))?;
                info!(start, reached, "backfill completed");
                Ok(())
            }
        }
    }
}

async fn connect_store(args: &StoreArgs) -> Result<AnyStore> {
    let options = args.to_store_options()?;
    let store = AnyStore::connect(options)
        .await
        .change_context(LedgerError::Store)
        .attach_printable("failed to connect to store")?;

    store
        .ensure_schema()
        .await
        .change_context(LedgerError::Store)
        .attach_printable("failed to create store schema")?;

    info!(store = store.kind(), "store ready");
    Ok(store)
}
