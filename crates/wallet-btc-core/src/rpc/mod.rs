//! Backend RPC abstraction layer.
//!
//! Two backends are consumed: a full node over HTTP JSON-RPC
//! ([`HttpRpcClient`]) and an ElectrumX server over newline-delimited
//! JSON-RPC on TCP ([`ElectrumClient`]). Consumers depend on the traits
//! below so tests can substitute the doubles in `mock`.

mod electrum;
pub(crate) mod http_adapter;
#[cfg(test)]
pub mod mock;
pub(crate) mod parsing;
pub(crate) mod protocol;

pub use electrum::ElectrumClient;
pub use http_adapter::HttpRpcClient;

use async_trait::async_trait;
use bitcoin::Txid;

use crate::error::CoreError;
use crate::types::RawTransaction;

/// One call of a batched request.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcCall {
    pub method: String,
    pub params: Vec<serde_json::Value>,
}

impl RpcCall {
    pub fn new(method: impl Into<String>, params: Vec<serde_json::Value>) -> Self {
        Self {
            method: method.into(),
            params,
        }
    }
}

/// One item of a batched response, tagged with the id the server echoed.
#[derive(Debug, Clone)]
pub struct BatchResponse {
    pub id: u64,
    pub outcome: Result<serde_json::Value, CoreError>,
}

/// ElectrumX JSON-RPC surface.
#[async_trait]
pub trait ElectrumRpc: Send + Sync {
    /// Issue a single call and return its `result`.
    async fn call(
        &self,
        method: &str,
        params: Vec<serde_json::Value>,
    ) -> Result<serde_json::Value, CoreError>;

    /// Issue a batch where request `i` carries id `i`.
    ///
    /// Responses come back in whatever order the server produced them;
    /// callers match them to requests by [`BatchResponse::id`]. A
    /// protocol error on one item is carried in that item's `outcome`.
    async fn call_batch(&self, calls: &[RpcCall]) -> Result<Vec<BatchResponse>, CoreError>;
}

/// The part of the full node's RPC surface the mempool watcher needs.
#[async_trait]
pub trait NodeRpc: Send + Sync {
    async fn get_raw_mempool(&self) -> Result<Vec<Txid>, CoreError>;
}

/// Verbose transaction lookup, served by either backend.
#[async_trait]
pub trait TxSource: Send + Sync {
    async fn get_transaction(&self, txid: &Txid) -> Result<RawTransaction, CoreError>;

    /// Fetch many transactions in one round trip where the backend allows.
    ///
    /// The result is aligned with `txids`; a slot is `None` when that id
    /// could not be fetched or parsed. An `Err` means the whole request
    /// failed.
    async fn get_transactions(
        &self,
        txids: &[Txid],
    ) -> Result<Vec<Option<RawTransaction>>, CoreError>;
}

/// Place batch responses at the position named by their id.
///
/// The result has `len` slots. A slot stays `None` when its response
/// carried a protocol error, was missing, or when the id is out of range;
/// each of those cases is logged.
pub fn scatter_by_id(
    method: &str,
    len: usize,
    responses: Vec<BatchResponse>,
) -> Vec<Option<serde_json::Value>> {
    let mut slots: Vec<Option<serde_json::Value>> = vec![None; len];
    for response in responses {
        let Some(slot) = usize::try_from(response.id)
            .ok()
            .and_then(|index| slots.get_mut(index))
        else {
            tracing::warn!(
                rpc.method = method,
                rpc.id = response.id,
                "batch response id out of range"
            );
            continue;
        };
        match response.outcome {
            Ok(value) => *slot = Some(value),
            Err(e) => {
                tracing::warn!(
                    rpc.method = method,
                    rpc.id = response.id,
                    error = %e,
                    "batch item failed"
                );
            }
        }
    }
    slots
}
