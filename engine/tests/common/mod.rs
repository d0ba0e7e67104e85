#![allow(dead_code)]

use std::{sync::Arc, time::Duration};

use ledger_chain::testing::{synthetic_block, MemoryChain};
use ledger_engine::{BackfillEngine, BackfillOptions, BackgroundHandle, BackgroundWorker, Resolver};
use ledger_store::{LedgerStore, MemoryStore};
use tokio_util::sync::CancellationToken;

pub type TestEngine = BackfillEngine<MemoryChain, MemoryStore>;
pub type TestResolver = Resolver<MemoryChain, MemoryStore>;

pub struct Harness {
    pub chain: Arc<MemoryChain>,
    pub store: Arc<MemoryStore>,
    pub engine: Arc<TestEngine>,
    pub resolver: TestResolver,
    pub background: BackgroundHandle,
    pub ct: CancellationToken,
}

impl Harness {
    /// Creates the engine and resolver and starts the background worker.
    pub fn new(head: u64, worker_count: usize) -> Self {
        let chain = Arc::new(MemoryChain::new(head));
        let store = Arc::new(MemoryStore::default());
        let engine = Arc::new(BackfillEngine::new(
            chain.clone(),
            store.clone(),
            BackfillOptions { worker_count },
        ));

        let (worker, background) = BackgroundWorker::new(store.clone(), engine.clone(), None);
        let ct = CancellationToken::new();
        tokio::spawn(worker.start(ct.clone()));

        let resolver = Resolver::new(
            chain.clone(),
            store.clone(),
            engine.clone(),
            background.clone(),
        );

        Self {
            chain,
            store,
            engine,
            resolver,
            background,
            ct,
        }
    }

    /// Stores the synthetic blocks `first..=last`.
    pub async fn seed(&self, first: u64, last: u64) {
        for number in first..=last {
            self.store
                .upsert_block(&synthetic_block(number))
                .await
                .unwrap();
        }
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.ct.cancel();
    }
}

/// Polls `condition` until it holds, panicking after two seconds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met in time");
}
