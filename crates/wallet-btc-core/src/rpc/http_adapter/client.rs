use std::collections::HashMap;
use std::num::NonZeroU32;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use bitcoin::Txid;
use futures::future::try_join_all;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use reqwest::{header, StatusCode};
use tracing::{debug, trace, warn};

use crate::error::CoreError;
use crate::types::RawTransaction;

use super::super::parsing::{parse_raw_transaction, parse_txid};
use super::super::protocol::{
    normalize_tx_not_found, parse_batch_id, parse_jsonrpc_error, JsonRpcRequest, JsonRpcResponse,
};
use super::super::{NodeRpc, RpcCall, TxSource};
use super::connection::{parse_http_url, resolve_auth};

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Bitcoin Core JSON-RPC client over HTTP(S).
///
/// Supports both single and batched RPC calls. Batches larger than the
/// configured chunk size are split and the chunks issued concurrently.
pub struct HttpRpcClient {
    client: reqwest::Client,
    url: String,
    auth: Option<(String, String)>,
    limiter: Option<DirectRateLimiter>,
    batch_chunk_size: usize,
    next_id: AtomicU64,
}

impl HttpRpcClient {
    /// Create a new client for an HTTP URL.
    ///
    /// Authentication precedence:
    /// 1. explicit `user` + `pass`
    /// 2. cookie file (`username:password`) from `cookie_file`
    /// 3. no auth
    ///
    /// If `requests_per_second` is set, calls are rate-limited per outbound
    /// HTTP request (batched calls count as one request).
    pub fn new(
        connection: &str,
        user: Option<&str>,
        pass: Option<&str>,
        cookie_file: Option<&Path>,
        requests_per_second: Option<u32>,
        batch_chunk_size: usize,
    ) -> Result<Self, CoreError> {
        if batch_chunk_size == 0 {
            return Err(CoreError::Param(
                "rpc batch chunk size must be at least 1".to_owned(),
            ));
        }
        let auth = resolve_auth(user, pass, cookie_file)?;
        let url = parse_http_url(connection)?;

        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(32)
            .tcp_nodelay(true)
            .no_proxy()
            .build()
            .map_err(|e| CoreError::Param(format!("build rpc http client: {e}")))?;

        let limiter = match requests_per_second {
            None => None,
            Some(limit) => {
                let limit = NonZeroU32::new(limit).ok_or_else(|| {
                    CoreError::Param("requests_per_second must be at least 1".to_owned())
                })?;
                Some(RateLimiter::direct(Quota::per_second(limit)))
            }
        };

        Ok(Self {
            client,
            url,
            auth,
            limiter,
            batch_chunk_size,
            next_id: AtomicU64::new(initial_request_id()),
        })
    }

    /// Atomically reserve `count` consecutive request IDs for batch calls.
    fn reserve_request_ids(&self, count: u64) -> u64 {
        self.next_id.fetch_add(count, Ordering::Relaxed)
    }

    async fn wait_for_rate_limit(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }
    }

    /// POST a JSON body and return the status and raw response text.
    async fn post<T: serde::Serialize + ?Sized>(
        &self,
        payload: &T,
    ) -> Result<(StatusCode, String), CoreError> {
        let mut builder = self
            .client
            .post(&self.url)
            .header(header::CONTENT_TYPE, "application/json")
            .json(payload);
        if let Some((ref user, ref pass)) = self.auth {
            builder = builder.basic_auth(user, Some(pass));
        }

        let response = builder
            .send()
            .await
            .map_err(|e| CoreError::Socket(format!("{}: {e}", self.url)))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| CoreError::Socket(format!("{}: {e}", self.url)))?;
        Ok((status, body))
    }

    async fn rpc_call(
        &self,
        method: &str,
        params: Vec<serde_json::Value>,
    ) -> Result<serde_json::Value, CoreError> {
        self.wait_for_rate_limit().await;
        let id = self.reserve_request_ids(1);
        debug!(
            rpc.id = id,
            rpc.method = method,
            rpc.params = params.len(),
            "rpc call"
        );

        let (status, body) = self.post(&JsonRpcRequest::new(id, method, &params)).await?;
        debug!(rpc.id = id, rpc.method = method, %status, body_len = body.len(), "rpc response");
        trace!(rpc.id = id, rpc.method = method, body = %body, "rpc response body");

        if status != StatusCode::OK {
            return Err(non_ok_status_error(status, &body));
        }

        let decoded: JsonRpcResponse = serde_json::from_str(&body).map_err(|e| {
            CoreError::InvalidResponse(format!("decode JSON-RPC response: {e}; body={body}"))
        })?;
        decoded.into_result()
    }

    /// Issue one HTTP batch. The result is ordered like `calls`; each item
    /// carries its own protocol error, or a missing-item error when the
    /// node omitted that id.
    async fn rpc_batch(
        &self,
        calls: &[RpcCall],
    ) -> Result<Vec<Result<serde_json::Value, CoreError>>, CoreError> {
        self.wait_for_rate_limit().await;
        let start_id = self.reserve_request_ids(calls.len() as u64);
        debug!(
            rpc.batch_start_id = start_id,
            rpc.batch_size = calls.len(),
            "rpc batch call"
        );
        let requests: Vec<JsonRpcRequest<'_>> = calls
            .iter()
            .enumerate()
            .map(|(offset, call)| {
                JsonRpcRequest::new(start_id + offset as u64, &call.method, &call.params)
            })
            .collect();

        let (status, body) = self.post(&requests).await?;
        debug!(
            rpc.batch_start_id = start_id,
            rpc.batch_size = calls.len(),
            %status,
            body_len = body.len(),
            "rpc batch response"
        );
        trace!(
            rpc.batch_start_id = start_id,
            rpc.batch_size = calls.len(),
            body = %body,
            "rpc batch response body"
        );

        if status != StatusCode::OK {
            return Err(non_ok_status_error(status, &body));
        }

        let decoded: Vec<JsonRpcResponse> = serde_json::from_str(&body).map_err(|e| {
            CoreError::InvalidResponse(format!("decode JSON-RPC batch response: {e}; body={body}"))
        })?;

        let mut by_id: HashMap<u64, JsonRpcResponse> = HashMap::with_capacity(decoded.len());
        for item in decoded {
            let id = parse_batch_id(&item.id)?;
            by_id.insert(id, item);
        }

        Ok((start_id..start_id + calls.len() as u64)
            .map(|id| match by_id.remove(&id) {
                Some(item) => item.into_result(),
                None => Err(CoreError::InvalidResponse(format!(
                    "missing batch response item for id {id}"
                ))),
            })
            .collect())
    }

    async fn rpc_batch_chunked(
        &self,
        calls: &[RpcCall],
    ) -> Result<Vec<Result<serde_json::Value, CoreError>>, CoreError> {
        if calls.is_empty() {
            return Ok(Vec::new());
        }

        // Keep each payload small enough for node/proxy limits while still
        // issuing chunks concurrently to avoid serial round-trip latency.
        let chunk_futures: Vec<_> = calls
            .chunks(self.batch_chunk_size)
            .map(|chunk| self.rpc_batch(chunk))
            .collect();
        let chunked = try_join_all(chunk_futures).await?;
        Ok(chunked.into_iter().flatten().collect())
    }
}

#[async_trait]
impl NodeRpc for HttpRpcClient {
    async fn get_raw_mempool(&self) -> Result<Vec<Txid>, CoreError> {
        let raw = self.rpc_call("getrawmempool", Vec::new()).await?;
        let ids = raw.as_array().ok_or_else(|| {
            CoreError::InvalidResponse(format!("getrawmempool: expected array, got {raw}"))
        })?;
        ids.iter()
            .map(|id| parse_txid(Some(id), "mempool txid"))
            .collect()
    }
}

#[async_trait]
impl TxSource for HttpRpcClient {
    async fn get_transaction(&self, txid: &Txid) -> Result<RawTransaction, CoreError> {
        let raw = self
            .rpc_call("getrawtransaction", getrawtransaction_params(txid))
            .await
            .map_err(|err| normalize_tx_not_found(txid, err))?;
        parse_raw_transaction(&raw)
    }

    async fn get_transactions(
        &self,
        txids: &[Txid],
    ) -> Result<Vec<Option<RawTransaction>>, CoreError> {
        let calls: Vec<RpcCall> = txids
            .iter()
            .map(|txid| RpcCall::new("getrawtransaction", getrawtransaction_params(txid)))
            .collect();

        let raw_results = self.rpc_batch_chunked(&calls).await?;
        Ok(txids
            .iter()
            .zip(raw_results)
            .map(|(txid, outcome)| {
                match outcome.and_then(|raw| parse_raw_transaction(&raw)) {
                    Ok(tx) => Some(tx),
                    Err(e) => {
                        warn!(%txid, error = %e, "getrawtransaction batch item failed");
                        None
                    }
                }
            })
            .collect())
    }
}

fn getrawtransaction_params(txid: &Txid) -> Vec<serde_json::Value> {
    vec![serde_json::json!(txid.to_string()), serde_json::json!(true)]
}

/// Older nodes report RPC errors with HTTP 404/500 and a JSON-RPC body;
/// surface that error when present, otherwise the bare status.
fn non_ok_status_error(status: StatusCode, body: &str) -> CoreError {
    match serde_json::from_str::<JsonRpcResponse>(body) {
        Ok(JsonRpcResponse {
            error: Some(err), ..
        }) => parse_jsonrpc_error(err),
        _ => CoreError::Network {
            status: status.as_u16(),
        },
    }
}

fn initial_request_id() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(1)
}
