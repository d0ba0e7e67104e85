use std::{future::IntoFuture, num::NonZeroU32, sync::Arc, time::Duration};

use alloy_primitives::B256;
use alloy_provider::{Provider, RootProvider};
use alloy_rpc_client::RpcClient;
use alloy_rpc_types_eth::{
    Block as RpcBlock, BlockId, BlockNumberOrTag, Transaction as RpcTransaction,
    TransactionReceipt,
};
use alloy_transport::{RpcError, TransportError, TransportResult};
use alloy_transport_http::Http;
use async_trait::async_trait;
use error_stack::{Report, Result, ResultExt};
use futures_util::{stream, StreamExt, TryStreamExt};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use ledger_primitives::{Block, Hash, Transaction};
use reqwest::header::{HeaderMap, HeaderValue};
use tokio::sync::Semaphore;
use tracing::{debug, instrument};
use url::Url;

use crate::{models, ChainSource, ChainSourceError};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_MAX_CONCURRENT_REQUESTS: usize = 64;
const DEFAULT_RECEIPT_CONCURRENCY: usize = 16;

/// Chain source backed by an Ethereum-compatible JSON-RPC node.
#[derive(Clone)]
pub struct JsonRpcChainSource {
    provider: RootProvider,
    url: Url,
    options: JsonRpcOptions,
    limiter: Option<Arc<DefaultDirectRateLimiter>>,
    semaphore: Arc<Semaphore>,
}

#[derive(Debug, Clone)]
pub struct JsonRpcOptions {
    /// Deadline for each request.
    pub timeout: Duration,
    /// Headers to send with the requests.
    pub headers: HeaderMap<HeaderValue>,
    /// Maximum number of requests per second. No limit if `None`.
    pub rate_limit: Option<NonZeroU32>,
    /// Maximum number of requests in flight.
    pub max_concurrent_requests: usize,
    /// Number of receipts fetched concurrently for a single block.
    pub receipt_concurrency: usize,
    /// Fetch receipts with `eth_getBlockReceipts` instead of one request per transaction.
    pub block_receipts: bool,
}

impl Default for JsonRpcOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            headers: HeaderMap::default(),
            rate_limit: None,
            max_concurrent_requests: DEFAULT_MAX_CONCURRENT_REQUESTS,
            receipt_concurrency: DEFAULT_RECEIPT_CONCURRENCY,
            block_receipts: false,
        }
    }
}

impl JsonRpcChainSource {
    pub fn new(url: impl AsRef<str>, options: JsonRpcOptions) -> Result<Self, ChainSourceError> {
        let url = Url::parse(url.as_ref())
            .change_context(ChainSourceError::Configuration)
            .attach_printable_lazy(|| format!("failed to parse rpc url: {}", url.as_ref()))?;

        let client = reqwest::Client::builder()
            .default_headers(options.headers.clone())
            .build()
            .change_context(ChainSourceError::Configuration)
            .attach_printable("failed to build http client")?;
        let transport = Http::with_client(client, url.clone());
        let provider = RootProvider::new(RpcClient::new(transport, false));

        let limiter = options.rate_limit.map(|rate_limit| {
            let quota = Quota::per_second(rate_limit).allow_burst(rate_limit);
            Arc::new(RateLimiter::direct(quota))
        });
        let semaphore = Arc::new(Semaphore::new(options.max_concurrent_requests.max(1)));

        Ok(Self {
            provider,
            url,
            options,
            limiter,
            semaphore,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    #[instrument(skip(self), err(Debug))]
    pub async fn get_block_number(&self) -> Result<u64, ChainSourceError> {
        self.call("eth_blockNumber", self.provider.get_block_number()).await
    }

    #[instrument(skip(self), err(Debug))]
    pub async fn get_block_by_number(&self, number: u64) -> Result<RpcBlock, ChainSourceError> {
        let request = self
            .provider
            .get_block_by_number(BlockNumberOrTag::Number(number))
            .full();
        self.call("eth_getBlockByNumber", request)
            .await?
            .ok_or(ChainSourceError::NotFound)
            .attach_printable_lazy(|| format!("block not found: {number}"))
    }

    #[instrument(skip(self), err(Debug))]
    pub async fn get_block_by_hash(&self, hash: &Hash) -> Result<RpcBlock, ChainSourceError> {
        let request = self.provider.get_block_by_hash(to_b256(hash)?).full();
        self.call("eth_getBlockByHash", request)
            .await?
            .ok_or(ChainSourceError::NotFound)
            .attach_printable_lazy(|| format!("block not found: {hash}"))
    }

    #[instrument(skip(self), err(Debug))]
    pub async fn get_transaction_by_hash(
        &self,
        hash: &Hash,
    ) -> Result<RpcTransaction, ChainSourceError> {
        let request = self.provider.get_transaction_by_hash(to_b256(hash)?);
        self.call("eth_getTransactionByHash", request)
            .await?
            .ok_or(ChainSourceError::NotFound)
            .attach_printable_lazy(|| format!("transaction not found: {hash}"))
    }

    #[instrument(skip(self), err(Debug))]
    pub async fn get_transaction_receipt(
        &self,
        hash: B256,
    ) -> Result<TransactionReceipt, ChainSourceError> {
        let request = self.provider.get_transaction_receipt(hash);
        self.call("eth_getTransactionReceipt", request)
            .await?
            .ok_or(ChainSourceError::NotFound)
            .attach_printable_lazy(|| format!("transaction receipt not found: {hash}"))
    }

    #[instrument(skip(self), err(Debug))]
    pub async fn get_block_receipts(
        &self,
        number: u64,
    ) -> Result<Vec<TransactionReceipt>, ChainSourceError> {
        let request = self
            .provider
            .get_block_receipts(BlockId::Number(BlockNumberOrTag::Number(number)));
        self.call("eth_getBlockReceipts", request)
            .await?
            .ok_or(ChainSourceError::NotFound)
            .attach_printable_lazy(|| format!("block receipts not found: {number}"))
    }

    async fn receipts_for_block(
        &self,
        block: &RpcBlock,
    ) -> Result<Vec<TransactionReceipt>, ChainSourceError> {
        let hashes = models::transaction_hashes(block);
        if hashes.is_empty() {
            return Ok(Vec::new());
        }

        if self.options.block_receipts {
            return self.get_block_receipts(block.header.number).await;
        }

        stream::iter(hashes)
            .map(|hash| self.get_transaction_receipt(hash))
            .buffered(self.options.receipt_concurrency.max(1))
            .try_collect()
            .await
    }

    async fn into_block(&self, block: RpcBlock) -> Result<Block, ChainSourceError> {
        let receipts = self.receipts_for_block(&block).await?;
        models::into_block(block, receipts)
    }

    /// Sends a request to the node, honoring the rate limit, the concurrency
    /// limit and the request deadline.
    async fn call<R, T>(&self, method: &'static str, request: R) -> Result<T, ChainSourceError>
    where
        R: IntoFuture<Output = TransportResult<T>>,
    {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }

        let _permit = self
            .semaphore
            .acquire()
            .await
            .change_context(ChainSourceError::Request)
            .attach_printable("request semaphore closed")?;

        debug!(method, "sending rpc request");

        match tokio::time::timeout(self.options.timeout, request).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(err)) => {
                Err(transport_error(err)).attach_printable_lazy(|| format!("method: {method}"))
            }
            Err(_) => Err(ChainSourceError::Timeout)
                .attach_printable_lazy(|| format!("timeout: {:?}", self.options.timeout))
                .attach_printable_lazy(|| format!("method: {method}")),
        }
    }
}

fn transport_error(err: TransportError) -> Report<ChainSourceError> {
    let (context, rpc_error) = match &err {
        RpcError::ErrorResp(payload) => (
            ChainSourceError::Rpc,
            Some((payload.code, payload.message.to_string())),
        ),
        RpcError::NullResp => (ChainSourceError::NotFound, None),
        RpcError::DeserError { .. } => (ChainSourceError::DeserializeResponse, None),
        _ => (ChainSourceError::Request, None),
    };

    let report = Report::new(err).change_context(context);
    match rpc_error {
        Some((code, message)) => report
            .attach_printable(format!("code: {code}"))
            .attach_printable(format!("message: {message}")),
        None => report,
    }
}

fn to_b256(hash: &Hash) -> Result<B256, ChainSourceError> {
    hash.as_str()
        .parse::<B256>()
        .change_context(ChainSourceError::Configuration)
        .attach_printable_lazy(|| format!("invalid hash: {hash}"))
}

#[async_trait]
impl ChainSource for JsonRpcChainSource {
    async fn current_height(&self) -> Result<u64, ChainSourceError> {
        self.get_block_number().await
    }

    async fn block_by_number(&self, number: u64) -> Result<Block, ChainSourceError> {
        let block = self.get_block_by_number(number).await?;
        self.into_block(block).await
    }

    async fn block_by_hash(&self, hash: &Hash) -> Result<Block, ChainSourceError> {
        let block = self.get_block_by_hash(hash).await?;
        self.into_block(block).await
    }

    async fn transaction_by_hash(&self, hash: &Hash) -> Result<Transaction, ChainSourceError> {
        let transaction = self.get_transaction_by_hash(hash).await?;
        let receipt = self.get_transaction_receipt(to_b256(hash)?).await?;
        models::into_included_transaction(transaction, receipt)
    }
}

impl std::fmt::Debug for JsonRpcChainSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonRpcChainSource")
            .field("url", &self.url.as_str())
            .field("options", &self.options)
            .finish()
    }
}
