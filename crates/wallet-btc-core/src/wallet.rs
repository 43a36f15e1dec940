//! Fee estimation and transaction broadcast through ElectrumX.

use bitcoin::Txid;
use serde_json::json;
use tracing::{debug, info};

use crate::error::CoreError;
use crate::rpc::ElectrumRpc;
use crate::types::FeeRate;

pub const ESTIMATE_FEE: &str = "blockchain.estimatefee";
pub const BROADCAST: &str = "blockchain.transaction.broadcast";

const SATS_PER_BTC: f64 = 100_000_000.0;

/// Factors applied to the base estimate for the faster tiers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeeMultipliers {
    pub quick: f64,
    pub priority: f64,
    pub normal: f64,
}

impl Default for FeeMultipliers {
    fn default() -> Self {
        Self {
            quick: 2.0,
            priority: 1.5,
            normal: 1.2,
        }
    }
}

fn scale(rate: u64, factor: f64) -> u64 {
    (rate as f64 * factor).round() as u64
}

/// Four fee tiers from one `blocks`-target estimate, fastest (weight 4)
/// first. Values are satoshis per kilobyte.
pub async fn estimate_fee_rates(
    rpc: &dyn ElectrumRpc,
    blocks: u32,
    multipliers: FeeMultipliers,
) -> Result<Vec<FeeRate>, CoreError> {
    let result = rpc.call(ESTIMATE_FEE, vec![json!(blocks)]).await?;
    let btc_per_kb = result.as_f64().ok_or_else(|| {
        CoreError::InvalidResponse(format!("{ESTIMATE_FEE}: expected a number, got {result}"))
    })?;
    if btc_per_kb < 0.0 {
        return Err(CoreError::EstimateUnavailable { blocks });
    }

    let rate = (btc_per_kb * SATS_PER_BTC).round() as u64;
    debug!(blocks, sat_per_kb = rate, "fee estimate");
    Ok(vec![
        FeeRate { weight: 4, value: scale(rate, multipliers.quick) },
        FeeRate { weight: 3, value: scale(rate, multipliers.priority) },
        FeeRate { weight: 2, value: scale(rate, multipliers.normal) },
        FeeRate { weight: 1, value: rate },
    ])
}

/// Relay a signed transaction and return the txid the server reports.
pub async fn broadcast_transaction(
    rpc: &dyn ElectrumRpc,
    raw_hex: &str,
) -> Result<Txid, CoreError> {
    let raw_hex = raw_hex.trim();
    if raw_hex.is_empty() {
        return Err(CoreError::Param("empty raw transaction".into()));
    }
    hex::decode(raw_hex).map_err(|e| CoreError::Param(format!("raw transaction is not hex: {e}")))?;

    let result = rpc.call(BROADCAST, vec![json!(raw_hex)]).await?;
    let txid: Txid = result
        .as_str()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| {
            CoreError::InvalidResponse(format!("{BROADCAST}: expected a txid, got {result}"))
        })?;
    info!(%txid, "broadcast transaction");
    Ok(txid)
}
