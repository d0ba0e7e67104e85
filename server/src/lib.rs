//! # Ledger indexer server
//!
//! Wires the chain source, the store and the indexing engine together and
//! exposes them over HTTP.
pub mod cli;
pub mod error;
pub mod http;

pub use self::error::{LedgerError, ReportExt};
