use std::num::NonZeroU32;

use clap::Args;
use error_stack::ResultExt;
use ledger_chain::{JsonRpcChainSource, JsonRpcOptions};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

use crate::error::{LedgerError, Result};

#[derive(Args, Clone, Debug)]
pub struct RpcArgs {
    /// Ethereum JSON-RPC URL.
    #[arg(
        long = "rpc.url",
        env = "LEDGER_RPC_URL",
        default_value = "http://localhost:8545"
    )]
    pub rpc_url: String,

    /// Timeout for each request.
    #[arg(long = "rpc.timeout", env = "LEDGER_RPC_TIMEOUT", default_value = "10s")]
    pub rpc_timeout: String,

    /// Headers to send with the requests, formatted as `name:value`.
    #[arg(long = "rpc.headers", env = "LEDGER_RPC_HEADERS")]
    pub rpc_headers: Vec<String>,

    /// Limit the number of requests per second.
    #[arg(long = "rpc.rate-limit", env = "LEDGER_RPC_RATE_LIMIT")]
    pub rpc_rate_limit: Option<u32>,

    /// Maximum number of requests in flight.
    #[arg(
        long = "rpc.max-concurrent-requests",
        env = "LEDGER_RPC_MAX_CONCURRENT_REQUESTS",
        default_value = "64"
    )]
    pub rpc_max_concurrent_requests: usize,

    /// Number of receipts fetched concurrently for each block.
    #[arg(
        long = "rpc.receipt-concurrency",
        env = "LEDGER_RPC_RECEIPT_CONCURRENCY",
        default_value = "16"
    )]
    pub rpc_receipt_concurrency: usize,

    /// Fetch receipts with `eth_getBlockReceipts`.
    ///
    /// Not every node supports this method.
    #[arg(long = "rpc.block-receipts", env = "LEDGER_RPC_BLOCK_RECEIPTS")]
    pub rpc_block_receipts: bool,
}

impl RpcArgs {
    pub fn to_chain_source(&self) -> Result<JsonRpcChainSource> {
        let options = self.to_json_rpc_options()?;
        JsonRpcChainSource::new(&self.rpc_url, options)
            .change_context(LedgerError::Configuration)
            .attach_printable("failed to create chain source")
            .attach_printable_lazy(|| format!("url: {}", self.rpc_url))
    }

    pub fn to_json_rpc_options(&self) -> Result<JsonRpcOptions> {
        let timeout = duration_str::parse_std(&self.rpc_timeout).or_else(|err| {
            Err(LedgerError::Configuration)
                .attach_printable("failed to parse rpc timeout")
                .attach_printable(format!("error: {}", err))
        })?;

        let headers = {
            let mut headers = HeaderMap::default();

            for kv in self.rpc_headers.iter() {
                let (key, value) = kv
                    .split_once(':')
                    .ok_or(LedgerError::Configuration)
                    .attach_printable("invalid header")
                    .attach_printable_lazy(|| format!("header: {}", kv))?;

                headers.insert(
                    key.trim()
                        .parse::<HeaderName>()
                        .change_context(LedgerError::Configuration)
                        .attach_printable("invalid header name")
                        .attach_printable_lazy(|| format!("header name: {}", key))?,
                    value
                        .trim()
                        .parse::<HeaderValue>()
                        .change_context(LedgerError::Configuration)
                        .attach_printable("invalid header value")
                        .attach_printable_lazy(|| format!("header value: {}", value))?,
                );
            }

            headers
        };

        Ok(JsonRpcOptions {
            timeout,
            headers,
            rate_limit: self.rpc_rate_limit.and_then(NonZeroU32::new),
            max_concurrent_requests: self.rpc_max_concurrent_requests,
            receipt_concurrency: self.rpc_receipt_concurrency,
            block_receipts: self.rpc_block_receipts,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use assert_matches::assert_matches;
    use clap::Parser;

    use super::*;

    #[derive(Parser, Debug)]
    struct TestCli {
        #[clap(flatten)]
        rpc: RpcArgs,
    }

    #[test]
    fn test_rpc_options() {
        let cli = TestCli::parse_from([
            "ledger",
            "--rpc.timeout",
            "3s",
            "--rpc.headers",
            "x-api-key: secret",
            "--rpc.rate-limit",
            "0",
        ]);

        let options = cli.rpc.to_json_rpc_options().unwrap();
        assert_eq!(options.timeout, Duration::from_secs(3));
        assert_eq!(options.headers.get("x-api-key").unwrap(), "secret");
        assert!(options.rate_limit.is_none());
        assert!(!options.block_receipts);
    }

    #[test]
    fn test_invalid_header() {
        let cli = TestCli::parse_from(["ledger", "--rpc.headers", "missing-separator"]);
        let err = cli.rpc.to_json_rpc_options().unwrap_err();
        assert_matches!(err.current_context(), LedgerError::Configuration);
    }

    #[test]
    fn test_invalid_timeout() {
        let cli = TestCli::parse_from(["ledger", "--rpc.timeout", "soon"]);
        let err = cli.rpc.to_json_rpc_options().unwrap_err();
        assert_matches!(err.current_context(), LedgerError::Configuration);
    }
}
