use ledger_observability::{Counter, Gauge};

#[derive(Debug, Clone)]
pub struct EngineMetrics {
    pub head: Gauge<u64>,
    pub indexed: Gauge<u64>,
    pub blocks_indexed: Counter<u64>,
    pub backfill_errors: Counter<u64>,
    pub lookups: Counter<u64>,
}

impl Default for EngineMetrics {
    fn default() -> Self {
        let meter = ledger_observability::meter("ledger_engine");

        Self {
            head: meter
                .u64_gauge("ledger.engine.head")
                .with_description("chain's head block")
                .with_unit("{block}")
                .build(),
            indexed: meter
                .u64_gauge("ledger.engine.indexed")
                .with_description("latest block indexed by backfill")
                .with_unit("{block}")
                .build(),
            blocks_indexed: meter
                .u64_counter("ledger.engine.blocks_indexed")
                .with_description("number of blocks fetched and stored")
                .with_unit("{block}")
                .build(),
            backfill_errors: meter
                .u64_counter("ledger.engine.backfill_errors")
                .with_description("number of failed backfill runs")
                .build(),
            lookups: meter
                .u64_counter("ledger.engine.lookups")
                .with_description("read path lookups by kind and source")
                .build(),
        }
    }
}
