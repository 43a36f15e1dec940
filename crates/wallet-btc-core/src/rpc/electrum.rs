//! ElectrumX client: one JSON-RPC request line per TCP connection.

use std::time::Duration;

use async_trait::async_trait;
use bitcoin::Txid;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::{debug, trace, warn};

use crate::error::CoreError;
use crate::types::RawTransaction;

use super::parsing::parse_raw_transaction;
use super::protocol::{
    normalize_tx_not_found, parse_batch_id, parse_jsonrpc_error, JsonRpcRequest, JsonRpcResponse,
};
use super::{scatter_by_id, BatchResponse, ElectrumRpc, RpcCall, TxSource};

const TRANSACTION_GET: &str = "blockchain.transaction.get";

/// Longest response line accepted from ElectrumX.
const MAX_RESPONSE_BYTES: u64 = 16 * 1024 * 1024;

/// Connects to ElectrumX for every request.
///
/// The whole exchange (connect, write, read one line) is bounded by
/// `timeout`; exceeding it is a [`CoreError::Socket`]. A response line
/// longer than `max_response_bytes` is a [`CoreError::InvalidResponse`].
#[derive(Debug, Clone)]
pub struct ElectrumClient {
    addr: String,
    timeout: Duration,
    max_response_bytes: u64,
}

impl ElectrumClient {
    pub fn new(host: &str, port: u16, timeout: Duration) -> Self {
        Self {
            addr: format!("{host}:{port}"),
            timeout,
            max_response_bytes: MAX_RESPONSE_BYTES,
        }
    }

    #[must_use]
    pub fn with_max_response_bytes(mut self, limit: u64) -> Self {
        self.max_response_bytes = limit;
        self
    }

    async fn exchange(&self, payload: &str) -> Result<String, CoreError> {
        tokio::time::timeout(self.timeout, self.exchange_inner(payload))
            .await
            .map_err(|_| {
                CoreError::Socket(format!(
                    "{}: no response within {:?}",
                    self.addr, self.timeout
                ))
            })?
    }

    async fn exchange_inner(&self, payload: &str) -> Result<String, CoreError> {
        let socket_err = |e: std::io::Error| CoreError::Socket(format!("{}: {e}", self.addr));

        let mut stream = TcpStream::connect(&self.addr).await.map_err(socket_err)?;
        let (reader, mut writer) = stream.split();
        writer.write_all(payload.as_bytes()).await.map_err(socket_err)?;
        writer.write_all(b"\n").await.map_err(socket_err)?;
        writer.flush().await.map_err(socket_err)?;

        let mut line = String::new();
        let read = BufReader::new(reader.take(self.max_response_bytes))
            .read_line(&mut line)
            .await
            .map_err(socket_err)?;
        if read == 0 {
            return Err(CoreError::Socket(format!(
                "{}: connection closed before a response",
                self.addr
            )));
        }
        if !line.ends_with('\n') && read as u64 >= self.max_response_bytes {
            return Err(CoreError::InvalidResponse(format!(
                "{}: response exceeds {} bytes",
                self.addr, self.max_response_bytes
            )));
        }
        Ok(line)
    }
}

fn encode<T: serde::Serialize + ?Sized>(request: &T) -> Result<String, CoreError> {
    serde_json::to_string(request)
        .map_err(|e| CoreError::InvalidResponse(format!("encode JSON-RPC request: {e}")))
}

#[async_trait]
impl ElectrumRpc for ElectrumClient {
    async fn call(
        &self,
        method: &str,
        params: Vec<serde_json::Value>,
    ) -> Result<serde_json::Value, CoreError> {
        debug!(rpc.method = method, rpc.params = params.len(), "electrum call");
        let line = self
            .exchange(&encode(&JsonRpcRequest::new(0, method, &params))?)
            .await?;
        trace!(rpc.method = method, body = %line.trim_end(), "electrum response");

        let decoded: JsonRpcResponse = serde_json::from_str(&line).map_err(|e| {
            CoreError::InvalidResponse(format!("decode JSON-RPC response: {e}; body={line}"))
        })?;
        decoded.into_result()
    }

    async fn call_batch(&self, calls: &[RpcCall]) -> Result<Vec<BatchResponse>, CoreError> {
        if calls.is_empty() {
            return Ok(Vec::new());
        }
        let requests: Vec<JsonRpcRequest<'_>> = calls
            .iter()
            .enumerate()
            .map(|(id, call)| JsonRpcRequest::new(id as u64, &call.method, &call.params))
            .collect();
        debug!(
            rpc.method = calls[0].method.as_str(),
            rpc.batch_size = calls.len(),
            "electrum batch call"
        );

        let line = self.exchange(&encode(&requests)?).await?;
        trace!(rpc.batch_size = calls.len(), body = %line.trim_end(), "electrum batch response");

        let decoded: serde_json::Value = serde_json::from_str(&line).map_err(|e| {
            CoreError::InvalidResponse(format!("decode JSON-RPC batch response: {e}; body={line}"))
        })?;

        let items = match decoded {
            serde_json::Value::Array(items) => items,
            // The server rejected the batch as a whole.
            other => {
                return Err(match other.get("error").cloned() {
                    Some(err) if !err.is_null() => parse_jsonrpc_error(err),
                    _ => CoreError::InvalidResponse(format!(
                        "expected batch response array, got {other}"
                    )),
                })
            }
        };

        let mut responses = Vec::with_capacity(items.len());
        for item in items {
            let parsed = serde_json::from_value::<JsonRpcResponse>(item)
                .map_err(|e| CoreError::InvalidResponse(format!("decode batch item: {e}")))
                .and_then(|resp| Ok((parse_batch_id(&resp.id)?, resp)));
            match parsed {
                Ok((id, resp)) => responses.push(BatchResponse {
                    id,
                    outcome: resp.into_result(),
                }),
                Err(e) => warn!(error = %e, "dropping unusable batch response item"),
            }
        }
        Ok(responses)
    }
}

#[async_trait]
impl TxSource for ElectrumClient {
    async fn get_transaction(&self, txid: &Txid) -> Result<RawTransaction, CoreError> {
        let raw = self
            .call(TRANSACTION_GET, transaction_get_params(txid))
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
            .map(|txid| RpcCall::new(TRANSACTION_GET, transaction_get_params(txid)))
            .collect();
        let responses = self.call_batch(&calls).await?;

        Ok(scatter_by_id(TRANSACTION_GET, txids.len(), responses)
            .into_iter()
            .zip(txids)
            .map(|(raw, txid)| {
                let raw = raw?;
                parse_raw_transaction(&raw)
                    .inspect_err(|e| warn!(%txid, error = %e, "unparseable transaction"))
                    .ok()
            })
            .collect())
    }
}

fn transaction_get_params(txid: &Txid) -> Vec<serde_json::Value> {
    vec![serde_json::json!(txid.to_string()), serde_json::json!(true)]
}
