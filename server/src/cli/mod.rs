mod backfill;
mod rpc;
mod server;
mod start;
mod store;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

pub use self::backfill::BackfillArgs;
pub use self::rpc::RpcArgs;
pub use self::server::ServerArgs;
pub use self::start::{BackfillCommand, StartCommand};
pub use self::store::StoreArgs;

use crate::error::Result;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the HTTP server and the periodic backfill.
    Start(StartCommand),
    /// Index blocks up to the chain head, then exit.
    Backfill(BackfillCommand),
}

impl Cli {
    pub async fn run(self, ct: CancellationToken) -> Result<()> {
        match self.command {
            Command::Start(command) => command.run(ct).await,
            Command::Backfill(command) => command.run(ct).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use clap::Parser;

    use super::*;

    #[test]
    fn test_parse_backfill_command() {
        let cli = Cli::parse_from([
            "ledger",
            "backfill",
            "--from-block",
            "100",
            "--backfill.workers",
            "4",
        ]);
        assert_matches!(cli.command, Command::Backfill(_));
    }

    #[test]
    fn test_parse_start_command() {
        let cli = Cli::parse_from([
            "ledger",
            "start",
            "--rpc.url",
            "http://localhost:8545",
            "--server.address",
            "127.0.0.1:3000",
            "--backfill.interval",
            "30s",
        ]);
        assert_matches!(cli.command, Command::Start(_));
    }
}
