use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::Json;
use bitcoin::Txid;
use serde::{Deserialize, Serialize};

use wallet_btc_core::enrich::enrich;
use wallet_btc_core::types::{EnrichedInput, EnrichedOutput};
use wallet_btc_core::wallet::broadcast_transaction;
use wallet_btc_core::{CoreError, EnrichedTransaction};

use super::error::{success, ApiResult};
use super::SharedState;

// ==============================================================================
// DTOs
// ==============================================================================

/// Wire form of an enriched transaction. Absent values become `""` or `-1`.
#[derive(Serialize)]
pub(super) struct TransactionResponse {
    txid: String,
    blockhash: String,
    iscoinbase: bool,
    fee: i64,
    inputs: Vec<InputResponse>,
    outputs: Vec<OutputResponse>,
    confirmations: i64,
    blocktime: String,
}

#[derive(Serialize)]
struct InputResponse {
    from_address: String,
    from_txid: String,
    vin_index: u32,
    value: u64,
}

#[derive(Serialize)]
struct OutputResponse {
    to_address: String,
    vout_index: u32,
    value: u64,
    #[serde(rename = "type")]
    script_type: String,
    asm: String,
}

impl From<&EnrichedInput> for InputResponse {
    fn from(input: &EnrichedInput) -> Self {
        Self {
            from_address: input.from_address.clone().unwrap_or_default(),
            from_txid: input.from_txid.to_string(),
            vin_index: input.vout_index,
            value: input.value.map_or(0, |v| v.to_sat()),
        }
    }
}

impl From<&EnrichedOutput> for OutputResponse {
    fn from(output: &EnrichedOutput) -> Self {
        Self {
            to_address: output.to_address.clone().unwrap_or_default(),
            vout_index: output.vout_index,
            value: output.value.to_sat(),
            script_type: output.script_type.clone(),
            asm: output.script_asm.clone(),
        }
    }
}

impl From<&EnrichedTransaction> for TransactionResponse {
    fn from(tx: &EnrichedTransaction) -> Self {
        Self {
            txid: tx.txid.to_string(),
            blockhash: tx.block_hash.map(|h| h.to_string()).unwrap_or_default(),
            iscoinbase: tx.is_coinbase,
            fee: tx
                .fee
                .and_then(|fee| i64::try_from(fee.to_sat()).ok())
                .unwrap_or(-1),
            inputs: tx.inputs.iter().map(InputResponse::from).collect(),
            outputs: tx.outputs.iter().map(OutputResponse::from).collect(),
            confirmations: tx
                .confirmations
                .and_then(|c| i64::try_from(c).ok())
                .unwrap_or(-1),
            blocktime: tx.block_time_utc.clone().unwrap_or_default(),
        }
    }
}

#[derive(Deserialize)]
pub(super) struct SendRawRequest {
    tx: String,
}

#[derive(Serialize)]
pub(super) struct SendRawResponse {
    txid: String,
}

// ==============================================================================
// Handlers
// ==============================================================================

pub(super) async fn get_transaction(
    State(state): State<SharedState>,
    Path(txid): Path<String>,
) -> ApiResult<TransactionResponse> {
    let txid: Txid = txid
        .parse()
        .map_err(|e| CoreError::Param(format!("invalid txid `{txid}`: {e}")))?;

    let tx = enrich(state.source.as_ref(), &txid, state.enrich_concurrency).await?;
    success(TransactionResponse::from(&tx))
}

pub(super) async fn send_raw_transaction(
    State(state): State<SharedState>,
    payload: Result<Json<SendRawRequest>, JsonRejection>,
) -> ApiResult<SendRawResponse> {
    let Json(request) = payload?;
    let txid = broadcast_transaction(state.electrum.as_ref(), &request.tx).await?;
    success(SendRawResponse {
        txid: txid.to_string(),
    })
}
