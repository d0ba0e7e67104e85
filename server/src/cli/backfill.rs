use std::time::Duration;

use clap::Args;
use error_stack::ResultExt;
use ledger_engine::BackfillOptions;

use crate::error::{LedgerError, Result};

#[derive(Args, Clone, Debug)]
pub struct BackfillArgs {
    /// Number of blocks indexed concurrently.
    #[arg(long = "backfill.workers", env = "LEDGER_BACKFILL_WORKERS", default_value = "10")]
    pub workers: usize,
    /// Interval between periodic backfills, e.g. `30s` or `1m`.
    #[arg(
        long = "backfill.interval",
        env = "LEDGER_BACKFILL_INTERVAL",
        default_value = "1m"
    )]
    pub interval: String,
    /// Number of background jobs (write-backs and backfills) waiting to run.
    #[arg(
        long = "backfill.queue-size",
        env = "LEDGER_BACKFILL_QUEUE_SIZE",
        default_value = "1024"
    )]
    pub queue_size: usize,
}

impl BackfillArgs {
    pub fn to_backfill_options(&self) -> BackfillOptions {
        BackfillOptions {
            worker_count: self.workers,
        }
    }

    pub fn interval(&self) -> Result<Duration> {
        let interval = duration_str::parse_std(&self.interval).or_else(|err| {
            Err(LedgerError::Configuration)
                .attach_printable("failed to parse backfill interval")
                .attach_printable(format!("error: {}", err))
        })?;

        if interval.is_zero() {
            return Err(LedgerError::Configuration)
                .attach_printable("backfill interval must be greater than zero");
        }

        Ok(interval)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use clap::Parser;

    use super::*;

    #[derive(Parser, Debug)]
    struct TestCli {
        #[clap(flatten)]
        backfill: BackfillArgs,
    }

    #[test]
    fn test_defaults() {
        let cli = TestCli::parse_from(["ledger"]);
        assert_eq!(cli.backfill.to_backfill_options().worker_count, 10);
        assert_eq!(cli.backfill.interval().unwrap(), Duration::from_secs(60));
    }

    #[test]
    fn test_zero_interval() {
        let cli = TestCli::parse_from(["ledger", "--backfill.interval", "0s"]);
        let err = cli.backfill.interval().unwrap_err();
        assert_matches!(err.current_context(), LedgerError::Configuration);
    }
}
