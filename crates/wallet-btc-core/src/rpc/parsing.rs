use bitcoin::{Amount, BlockHash, OutPoint, Txid};

use crate::error::CoreError;
use crate::types::{RawInput, RawOutput, RawTransaction};

/// Parse a verbose transaction (`getrawtransaction <txid> true`, or
/// ElectrumX `blockchain.transaction.get <txid> true`).
pub(crate) fn parse_raw_transaction(raw: &serde_json::Value) -> Result<RawTransaction, CoreError> {
    let txid = parse_txid(raw.get("txid"), "txid")?;
    let block_hash = parse_opt_block_hash(raw.get("blockhash"))?;
    let block_time = raw.get("blocktime").and_then(serde_json::Value::as_i64);
    let confirmations = raw.get("confirmations").and_then(serde_json::Value::as_u64);

    let vin = raw
        .get("vin")
        .and_then(serde_json::Value::as_array)
        .ok_or_else(|| CoreError::InvalidResponse(format!("{txid}: missing vin array")))?;
    let vout = raw
        .get("vout")
        .and_then(serde_json::Value::as_array)
        .ok_or_else(|| CoreError::InvalidResponse(format!("{txid}: missing vout array")))?;

    Ok(RawTransaction {
        txid,
        block_hash,
        block_time,
        confirmations,
        inputs: parse_vin(vin)?,
        outputs: parse_vout(vout)?,
    })
}

pub(crate) fn parse_txid(
    value: Option<&serde_json::Value>,
    field: &str,
) -> Result<Txid, CoreError> {
    let value = value
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| CoreError::InvalidResponse(format!("missing {field}")))?;
    value
        .parse()
        .map_err(|e| CoreError::InvalidResponse(format!("invalid {field}: {e}")))
}

fn parse_opt_block_hash(value: Option<&serde_json::Value>) -> Result<Option<BlockHash>, CoreError> {
    match value.and_then(serde_json::Value::as_str) {
        None => Ok(None),
        Some(s) => s
            .parse()
            .map(Some)
            .map_err(|e| CoreError::InvalidResponse(format!("invalid blockhash: {e}"))),
    }
}

fn parse_vin(vin: &[serde_json::Value]) -> Result<Vec<RawInput>, CoreError> {
    vin.iter()
        .map(|input| {
            if input.get("coinbase").is_some() {
                return Ok(RawInput { prevout: None });
            }
            let prev_txid = parse_txid(input.get("txid"), "vin.txid")?;
            let prev_vout = input
                .get("vout")
                .and_then(serde_json::Value::as_u64)
                .and_then(|n| u32::try_from(n).ok())
                .ok_or_else(|| CoreError::InvalidResponse("missing vin.vout".into()))?;
            Ok(RawInput {
                prevout: Some(OutPoint::new(prev_txid, prev_vout)),
            })
        })
        .collect()
}

// Outputs are indexed by array position; `vout.n` is not consulted.
fn parse_vout(vout: &[serde_json::Value]) -> Result<Vec<RawOutput>, CoreError> {
    vout.iter()
        .map(|output| {
            let value = parse_btc_amount(
                output
                    .get("value")
                    .ok_or_else(|| CoreError::InvalidResponse("missing value in vout".into()))?,
            )?;
            let spk = output
                .get("scriptPubKey")
                .ok_or_else(|| CoreError::InvalidResponse("missing scriptPubKey in vout".into()))?;

            Ok(RawOutput {
                value,
                address: single_address(spk),
                script_type: string_field(spk, "type"),
                script_asm: string_field(spk, "asm"),
            })
        })
        .collect()
}

/// Newer nodes report `address`; older ones report an `addresses` array,
/// which only counts when it holds exactly one entry.
fn single_address(spk: &serde_json::Value) -> Option<String> {
    if let Some(address) = spk.get("address").and_then(serde_json::Value::as_str) {
        return Some(address.to_owned());
    }
    match spk.get("addresses").and_then(serde_json::Value::as_array) {
        Some(list) if list.len() == 1 => list[0].as_str().map(str::to_owned),
        _ => None,
    }
}

fn string_field(value: &serde_json::Value, field: &str) -> String {
    value
        .get(field)
        .and_then(serde_json::Value::as_str)
        .unwrap_or_default()
        .to_owned()
}

/// Parse a BTC amount from a JSON value.
///
/// Number values are parsed via `Amount::from_float_in` to support scientific
/// notation, while string values are parsed via `Amount::from_str_in`.
pub(crate) fn parse_btc_amount(value: &serde_json::Value) -> Result<Amount, CoreError> {
    match value {
        serde_json::Value::Number(n) => {
            let parsed = n.as_f64().ok_or_else(|| {
                CoreError::InvalidResponse(format!("invalid BTC amount `{value}`"))
            })?;
            Amount::from_float_in(parsed, bitcoin::Denomination::Bitcoin).map_err(|e| {
                CoreError::InvalidResponse(format!("invalid BTC amount `{value}`: {e}"))
            })
        }
        serde_json::Value::String(s) => Amount::from_str_in(s, bitcoin::Denomination::Bitcoin)
            .map_err(|e| CoreError::InvalidResponse(format!("invalid BTC amount `{s}`: {e}"))),
        _ => Err(CoreError::InvalidResponse(format!(
            "expected numeric BTC amount, got: {value}"
        ))),
    }
}
