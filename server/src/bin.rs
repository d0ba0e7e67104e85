use std::process::ExitCode;

use clap::Parser;
use error_stack::ResultExt;
use ledger_observability::init_opentelemetry;
use ledger_server::{cli::Cli, error::Result, LedgerError, ReportExt};
use tokio_util::sync::CancellationToken;
use tracing::info;

#[cfg(not(windows))]
#[global_allocator]
static ALLOC: jemallocator::Jemalloc = jemallocator::Jemalloc;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Cli::parse();
    run_with_args(args).await.to_exit_code()
}

async fn run_with_args(args: Cli) -> Result<()> {
    init_opentelemetry(env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
        .change_context(LedgerError::Configuration)
        .attach_printable("failed to initialize opentelemetry")?;

    let ct = CancellationToken::new();

    ctrlc::set_handler({
        let ct = ct.clone();
        move || {
            info!("SIGINT received");
            ct.cancel();
        }
    })
    .change_context(LedgerError::Fatal)
    .attach_printable("failed to set SIGINT handler")?;

    args.run(ct).await
}
