//! # Ledger indexing engine
//!
//! - [BackfillEngine] indexes a range of blocks with a bounded number of
//!   concurrent workers, following the chain head while it moves.
//! - [PeriodicBackfill] runs the engine on a fixed interval.
//! - [Resolver] serves lookups from the store and falls back to the chain
//!   source on a miss. Writes triggered by lookups go through the
//!   [BackgroundWorker] so that callers never wait on them.
mod backfill;
mod error;
mod metrics;
mod periodic;
mod resolver;
mod worker;

pub use self::backfill::{BackfillEngine, BackfillOptions};
pub use self::error::{BackfillError, ResolveError, ResolveErrorExt};
pub use self::metrics::EngineMetrics;
pub use self::periodic::PeriodicBackfill;
pub use self::resolver::{
    effective_limit, parse_block_id, parse_transaction_hash, Resolver, DEFAULT_LIST_LIMIT,
    MAX_LIST_LIMIT,
};
pub use self::worker::{BackgroundHandle, BackgroundJob, BackgroundWorker};
