use std::{fmt, process::ExitCode};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Configuration error. Should not retry.
    Configuration,
    /// Store error. Can retry.
    Store,
    /// Backfill error. Can retry.
    Backfill,
    /// HTTP server error.
    Server,
    /// Fatal error. Should not retry.
    Fatal,
}

pub type Result<T> = error_stack::Result<T, LedgerError>;

impl error_stack::Context for LedgerError {}

impl fmt::Display for LedgerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerError::Configuration => f.write_str("ledger error: configuration"),
            LedgerError::Store => f.write_str("ledger error: store"),
            LedgerError::Backfill => f.write_str("ledger error: backfill"),
            LedgerError::Server => f.write_str("ledger error: http server"),
            LedgerError::Fatal => f.write_str("ledger error: fatal"),
        }
    }
}

pub trait ReportExt {
    fn to_exit_code(&self) -> ExitCode;
}

impl<T> ReportExt for Result<T> {
    fn to_exit_code(&self) -> ExitCode {
        match self {
            Ok(_) => ExitCode::SUCCESS,
            Err(err) => {
                eprintln!("{:?}", err);
                // Exit codes based on sysexits.h
                match err.current_context() {
                    LedgerError::Configuration => ExitCode::from(78),
                    LedgerError::Store | LedgerError::Backfill => ExitCode::from(75),
                    LedgerError::Server | LedgerError::Fatal => ExitCode::FAILURE,
                }
            }
        }
    }
}
