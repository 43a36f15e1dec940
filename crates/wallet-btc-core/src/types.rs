//! Domain types for the wallet backend.
//!
//! Contains the backend-native transaction shape (`RawTransaction`), the
//! enriched application-level records (`EnrichedTransaction`, `EnrichedInput`,
//! `EnrichedOutput`), the per-address query results, and the notify hub
//! directory/push records.

use std::fmt;

use bitcoin::{Amount, BlockHash, OutPoint, Txid};
use serde::{Deserialize, Serialize};

// ==============================================================================
// Script Hash
// ==============================================================================

/// ElectrumX address index key: byte-reversed SHA-256 of an output script,
/// lower-case hex.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScriptHash(pub(crate) String);

impl ScriptHash {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ScriptHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ==============================================================================
// Raw Transactions
// ==============================================================================

/// A transaction as reported by a backend (verbose `getrawtransaction` shape).
#[derive(Debug, Clone, PartialEq)]
pub struct RawTransaction {
    pub txid: Txid,
    pub block_hash: Option<BlockHash>,
    /// Block timestamp in seconds since the Unix epoch.
    pub block_time: Option<i64>,
    pub confirmations: Option<u64>,
    pub inputs: Vec<RawInput>,
    pub outputs: Vec<RawOutput>,
}

impl RawTransaction {
    /// A coinbase transaction's first input has no previous-output reference.
    pub fn is_coinbase(&self) -> bool {
        self.inputs
            .first()
            .is_some_and(|input| input.prevout.is_none())
    }
}

/// A transaction input. For coinbase inputs, `prevout` is `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct RawInput {
    pub prevout: Option<OutPoint>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawOutput {
    pub value: Amount,
    /// Set only when the script resolves to exactly one address.
    pub address: Option<String>,
    /// Backend script classification, e.g. `pubkeyhash` or `multisig`.
    pub script_type: String,
    pub script_asm: String,
}

// ==============================================================================
// Enriched Transactions
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedTransaction {
    pub txid: Txid,
    pub block_hash: Option<BlockHash>,
    pub is_coinbase: bool,
    /// `None` when any input is unresolved, since the true fee is unknown.
    pub fee: Option<Amount>,
    pub inputs: Vec<EnrichedInput>,
    pub outputs: Vec<EnrichedOutput>,
    /// `None` for transactions the backend reports no confirmation count for.
    pub confirmations: Option<u64>,
    /// Block time as `YYYY-MM-DDTHH:MM:SS+0000`.
    pub block_time_utc: Option<String>,
}

/// A spent output, resolved from its funding transaction.
///
/// `value` is `None` when the funding transaction or the referenced output
/// could not be found. A resolved output whose script has no single address
/// has a `value` but no `from_address`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedInput {
    pub from_address: Option<String>,
    pub from_txid: Txid,
    pub vout_index: u32,
    pub value: Option<Amount>,
}

impl EnrichedInput {
    pub fn is_resolved(&self) -> bool {
        self.value.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedOutput {
    pub to_address: Option<String>,
    pub vout_index: u32,
    pub value: Amount,
    pub script_type: String,
    pub script_asm: String,
}

// ==============================================================================
// Address Queries
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressUnspent {
    pub address: String,
    pub txid: Txid,
    pub vout_index: u32,
    pub value: Amount,
    /// Confirmation height; 0 while in the mempool.
    pub height: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressBalance {
    pub address: String,
    /// Satoshis; the unconfirmed part may be negative while spends are pending.
    pub confirmed: i64,
    pub unconfirmed: i64,
}

impl AddressBalance {
    pub fn total(&self) -> i64 {
        self.confirmed + self.unconfirmed
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressUsed {
    pub address: String,
    pub used: bool,
}

/// One entry of `blockchain.scripthash.get_history`.
///
/// ElectrumX reports `height == 0` for mempool transactions and `-1` for
/// mempool transactions with unconfirmed parents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryItem {
    pub tx_hash: Txid,
    pub height: i64,
}

impl HistoryItem {
    pub fn is_unconfirmed(&self) -> bool {
        self.height <= 0
    }
}

/// A page of address history, resolved into enriched transactions.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryPage {
    pub page: usize,
    pub size: usize,
    pub transactions: Vec<EnrichedTransaction>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeRate {
    pub weight: u8,
    /// Satoshis per kilobyte.
    pub value: u64,
}

// ==============================================================================
// Notify Hub
// ==============================================================================

/// A subscriber watching one address, as listed by the notify hub.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    /// The watched address.
    pub name: String,
    pub chain_type: String,
    pub chain_id: String,
    pub cid: String,
    pub language: String,
    pub platform: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum MsgType {
    Receive,
    Spend,
}

impl From<MsgType> for u8 {
    fn from(kind: MsgType) -> Self {
        match kind {
            MsgType::Receive => 1,
            MsgType::Spend => 2,
        }
    }
}

impl TryFrom<u8> for MsgType {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Receive),
            2 => Ok(Self::Spend),
            other => Err(format!("unknown msg_type {other}")),
        }
    }
}

/// One notification for one subscriber, as posted to `/v1/push`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushEvent {
    pub chain_type: String,
    pub chain_id: String,
    pub msg_type: MsgType,
    pub cid: String,
    /// Stable per (msg_type, txid, index) so the hub can drop duplicates.
    pub msg_id: String,
    pub language: String,
    pub token_name: String,
    pub name: String,
    pub platform: String,
}
