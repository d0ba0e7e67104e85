//! HTTP routes over the [Resolver].
use std::{convert::Infallible, net::SocketAddr, sync::Arc};

use error_stack::{Report, ResultExt};
use ledger_chain::ChainSource;
use ledger_engine::{
    parse_block_id, parse_transaction_hash, BackfillError, ResolveError, Resolver,
};
use ledger_store::LedgerStore;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use warp::{
    http::StatusCode,
    reject::{self, Reject},
    reply, Filter, Rejection, Reply,
};

use crate::error::{LedgerError, Result};

/// Serves the read path and backfill endpoints.
pub struct HttpServer<C, S> {
    address: SocketAddr,
    resolver: Arc<Resolver<C, S>>,
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    limit: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BackfillQuery {
    from: Option<String>,
}

#[derive(Debug, Serialize)]
struct BackfillResponse {
    reached: u64,
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    latest_stored: Option<u64>,
    chain_head: u64,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

/// An error returned to the client with its status code.
#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl Reject for ApiError {}

impl<C, S> HttpServer<C, S>
where
    C: ChainSource + 'static,
    S: LedgerStore + 'static,
{
    pub fn new(address: SocketAddr, resolver: Arc<Resolver<C, S>>) -> Self {
        Self { address, resolver }
    }

    /// Serves requests until `ct` is cancelled.
    pub async fn start(self, ct: CancellationToken) -> Result<()> {
        let (address, server) = warp::serve(routes(self.resolver))
            .try_bind_with_graceful_shutdown(self.address, async move { ct.cancelled().await })
            .change_context(LedgerError::Server)
            .attach_printable("failed to bind http server")
            .attach_printable_lazy(|| format!("address: {}", self.address))?;

        info!(address = %address, "starting http server");
        server.await;
        info!("http server stopped");

        Ok(())
    }
}

/// Returns all routes served by the [HttpServer].
pub fn routes<C, S>(
    resolver: Arc<Resolver<C, S>>,
) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone
where
    C: ChainSource + 'static,
    S: LedgerStore + 'static,
{
    let list_blocks_route = warp::get()
        .and(warp::path!("blocks"))
        .and(warp::query::<ListQuery>())
        .and(with_resolver(resolver.clone()))
        .and_then(list_blocks::<C, S>);

    let get_block_route = warp::get()
        .and(warp::path!("blocks" / String))
        .and(with_resolver(resolver.clone()))
        .and_then(get_block::<C, S>);

    let get_transaction_route = warp::get()
        .and(warp::path!("transaction" / String))
        .and(with_resolver(resolver.clone()))
        .and_then(get_transaction::<C, S>);

    let backfill_route = warp::post()
        .and(warp::path!("backfill"))
        .and(warp::query::<BackfillQuery>())
        .and(with_resolver(resolver.clone()))
        .and_then(backfill::<C, S>);

    let status_route = warp::get()
        .and(warp::path!("status"))
        .and(with_resolver(resolver))
        .and_then(status::<C, S>);

    list_blocks_route
        .or(get_block_route)
        .or(get_transaction_route)
        .or(backfill_route)
        .or(status_route)
        .recover(handle_rejection)
}

fn with_resolver<C, S>(
    resolver: Arc<Resolver<C, S>>,
) -> impl Filter<Extract = (Arc<Resolver<C, S>>,), Error = Infallible> + Clone
where
    C: ChainSource + 'static,
    S: LedgerStore + 'static,
{
    warp::any().map(move || resolver.clone())
}

async fn list_blocks<C, S>(
    query: ListQuery,
    resolver: Arc<Resolver<C, S>>,
) -> std::result::Result<impl Reply, Rejection>
where
    C: ChainSource + 'static,
    S: LedgerStore + 'static,
{
    // Unparsable limits fall back to the default.
    let limit = query.limit.and_then(|limit| limit.parse::<i64>().ok());
    let blocks = resolver
        .list_recent_blocks(limit)
        .await
        .map_err(resolve_rejection)?;
    Ok(reply::json(&blocks))
}

async fn get_block<C, S>(
    id: String,
    resolver: Arc<Resolver<C, S>>,
) -> std::result::Result<impl Reply, Rejection>
where
    C: ChainSource + 'static,
    S: LedgerStore + 'static,
{
    let id = parse_block_id(&id).map_err(resolve_rejection)?;
    let block = resolver
        .resolve_block(&id)
        .await
        .map_err(resolve_rejection)?;
    Ok(reply::json(&block))
}

async fn get_transaction<C, S>(
    hash: String,
    resolver: Arc<Resolver<C, S>>,
) -> std::result::Result<impl Reply, Rejection>
where
    C: ChainSource + 'static,
    S: LedgerStore + 'static,
{
    let hash = parse_transaction_hash(&hash).map_err(resolve_rejection)?;
    let transaction = resolver
        .resolve_transaction(&hash)
        .await
        .map_err(resolve_rejection)?;
    Ok(reply::json(&transaction))
}

async fn backfill<C, S>(
    query: BackfillQuery,
    resolver: Arc<Resolver<C, S>>,
) -> std::result::Result<impl Reply, Rejection>
where
    C: ChainSource + 'static,
    S: LedgerStore + 'static,
{
    let start = match query.from {
        None => None,
        Some(from) => Some(
            from.parse::<u64>()
                .map_err(|_| bad_request(format!("invalid start block: {from}")))?,
        ),
    };

    let reached = resolver
        .run_backfill(start)
        .await
        .map_err(backfill_rejection)?;
    Ok(reply::json(&BackfillResponse { reached }))
}

async fn status<C, S>(resolver: Arc<Resolver<C, S>>) -> std::result::Result<impl Reply, Rejection>
where
    C: ChainSource + 'static,
    S: LedgerStore + 'static,
{
    let (latest_stored, chain_head) = resolver.status().await.map_err(resolve_rejection)?;
    Ok(reply::json(&StatusResponse {
        latest_stored,
        chain_head,
    }))
}

fn bad_request(message: String) -> Rejection {
    reject::custom(ApiError {
        status: StatusCode::BAD_REQUEST,
        message,
    })
}

fn resolve_rejection(err: Report<ResolveError>) -> Rejection {
    let (status, message) = match err.current_context() {
        ResolveError::InvalidInput => {
            // Echo the offending input back to the client.
            let message = err
                .frames()
                .find_map(|frame| frame.downcast_ref::<String>())
                .map_or("invalid input", String::as_str);
            (StatusCode::BAD_REQUEST, message)
        }
        ResolveError::NotFound => (StatusCode::NOT_FOUND, "not found"),
        ResolveError::Unavailable => (StatusCode::SERVICE_UNAVAILABLE, "chain source unavailable"),
        ResolveError::Store => (StatusCode::INTERNAL_SERVER_ERROR, "store error"),
    };

    if status.is_server_error() {
        warn!(err = ?err, "request failed");
    }

    reject::custom(ApiError {
        status,
        message: message.to_string(),
    })
}

fn backfill_rejection(err: Report<BackfillError>) -> Rejection {
    let status = match err.current_context() {
        BackfillError::Store => StatusCode::INTERNAL_SERVER_ERROR,
        BackfillError::Head | BackfillError::Block(_) => StatusCode::SERVICE_UNAVAILABLE,
    };
    let message = err.current_context().to_string();

    warn!(err = ?err, "backfill request failed");

    reject::custom(ApiError { status, message })
}

async fn handle_rejection(err: Rejection) -> std::result::Result<impl Reply, Infallible> {
    let (status, message) = if let Some(err) = err.find::<ApiError>() {
        (err.status, err.message.clone())
    } else if err.is_not_found() {
        (StatusCode::NOT_FOUND, "not found".to_string())
    } else if err.find::<reject::MethodNotAllowed>().is_some() {
        (
            StatusCode::METHOD_NOT_ALLOWED,
            "method not allowed".to_string(),
        )
    } else if err.find::<reject::InvalidQuery>().is_some() {
        (StatusCode::BAD_REQUEST, "invalid query".to_string())
    } else {
        error!(err = ?err, "unhandled rejection");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal error".to_string(),
        )
    };

    Ok(reply::with_status(
        reply::json(&ErrorResponse { error: message }),
        status,
    ))
}
