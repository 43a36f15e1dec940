use bitcoin::Txid;

use crate::error::CoreError;

#[derive(serde::Serialize)]
pub(crate) struct JsonRpcRequest<'a> {
    pub(crate) jsonrpc: &'static str,
    pub(crate) id: u64,
    pub(crate) method: &'a str,
    pub(crate) params: &'a [serde_json::Value],
}

impl<'a> JsonRpcRequest<'a> {
    pub(crate) fn new(id: u64, method: &'a str, params: &'a [serde_json::Value]) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method,
            params,
        }
    }
}

#[derive(serde::Deserialize)]
pub(crate) struct JsonRpcResponse {
    #[serde(default)]
    pub(crate) id: serde_json::Value,
    pub(crate) result: Option<serde_json::Value>,
    pub(crate) error: Option<serde_json::Value>,
}

impl JsonRpcResponse {
    /// A non-null `error` wins over any `result`.
    pub(crate) fn into_result(self) -> Result<serde_json::Value, CoreError> {
        if let Some(err) = self.error {
            return Err(parse_jsonrpc_error(err));
        }
        Ok(self.result.unwrap_or(serde_json::Value::Null))
    }
}

/// Parse a JSON-RPC error value into a structured `CoreError`.
///
/// JSON-RPC 2.0 defines errors as `{"code": <int>, "message": <string>}`.
/// If the error value matches that shape, we produce `CoreError::Rpc`;
/// otherwise we fall back to `InvalidResponse` with the raw JSON.
pub(crate) fn parse_jsonrpc_error(err: serde_json::Value) -> CoreError {
    #[derive(serde::Deserialize)]
    struct JsonRpcError {
        code: i64,
        message: String,
    }

    match serde_json::from_value::<JsonRpcError>(err.clone()) {
        Ok(parsed) => CoreError::Rpc {
            code: parsed.code,
            message: parsed.message,
        },
        Err(_) => CoreError::InvalidResponse(format!("non-standard JSON-RPC error: {err}")),
    }
}

pub(crate) fn parse_batch_id(id: &serde_json::Value) -> Result<u64, CoreError> {
    if let Some(n) = id.as_u64() {
        return Ok(n);
    }

    if let Some(s) = id.as_str() {
        return s.parse::<u64>().map_err(|e| {
            CoreError::InvalidResponse(format!("invalid batch response id string: {e}"))
        });
    }

    Err(CoreError::InvalidResponse(format!(
        "invalid batch response id: {id}"
    )))
}

/// Convert "missing tx" JSON-RPC errors into `TxNotFound`.
///
/// Bitcoin Core reports code -5; ElectrumX wraps the daemon message in its
/// own error code, so the message text is checked as well. Other failures
/// are preserved as-is.
pub(crate) fn normalize_tx_not_found(txid: &Txid, err: CoreError) -> CoreError {
    match err {
        CoreError::Rpc { code, ref message } if is_tx_not_found(code, message) => {
            CoreError::TxNotFound(*txid)
        }
        other => other,
    }
}

fn is_tx_not_found(code: i64, message: &str) -> bool {
    let msg = message.to_ascii_lowercase();
    msg.contains("no such mempool or blockchain transaction")
        || (code == -5 && msg.contains("not found"))
}
