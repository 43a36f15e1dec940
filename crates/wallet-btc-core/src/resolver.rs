//! Per-address ElectrumX queries.
//!
//! Every query maps its addresses to script hashes, issues one batch where
//! request `i` is about address `i`, and scatters the responses back by id.
//! A slot whose address has no script hash, or whose response failed, was
//! missing or did not parse, is `None`; only a batch-level failure is an
//! error.

use bitcoin::{Amount, Txid};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::enrich::enrich_batch;
use crate::error::CoreError;
use crate::rpc::{scatter_by_id, ElectrumRpc, RpcCall, TxSource};
use crate::scripthash::script_hashes;
use crate::types::{AddressBalance, AddressUnspent, AddressUsed, HistoryItem, HistoryPage};

pub const LIST_UNSPENT: &str = "blockchain.scripthash.listunspent";
pub const GET_BALANCE: &str = "blockchain.scripthash.get_balance";
pub const GET_HISTORY: &str = "blockchain.scripthash.get_history";
pub const HAS_USED: &str = "blockchain.scripthash.has_used";

#[derive(Deserialize)]
struct UnspentEntry {
    tx_hash: Txid,
    tx_pos: u32,
    height: i64,
    value: u64,
}

#[derive(Deserialize)]
struct BalanceEntry {
    confirmed: i64,
    unconfirmed: i64,
}

#[derive(Deserialize)]
struct HistoryEntry {
    tx_hash: Txid,
    height: i64,
}

/// Issue `method` for every address and decode each slot as `T`.
async fn query_by_script_hash<T: DeserializeOwned>(
    rpc: &dyn ElectrumRpc,
    method: &str,
    addresses: &[String],
) -> Result<Vec<Option<T>>, CoreError> {
    if addresses.is_empty() {
        return Ok(Vec::new());
    }

    let (hashes, _) = script_hashes(addresses);
    // Request id `i` is about address `positions[i]`.
    let (positions, calls): (Vec<usize>, Vec<RpcCall>) = hashes
        .iter()
        .enumerate()
        .filter_map(|(position, hash)| {
            let hash = hash.as_ref()?;
            Some((position, RpcCall::new(method, vec![serde_json::json!(hash.as_str())])))
        })
        .unzip();

    let mut slots: Vec<Option<T>> = addresses.iter().map(|_| None).collect();
    if calls.is_empty() {
        return Ok(slots);
    }
    debug!(rpc.method = method, rpc.batch_size = calls.len(), "address batch query");

    let responses = rpc.call_batch(&calls).await?;
    for (slot, position) in scatter_by_id(method, calls.len(), responses)
        .into_iter()
        .zip(positions)
    {
        let Some(value) = slot else { continue };
        let address = &addresses[position];
        slots[position] = serde_json::from_value(value)
            .inspect_err(|e| {
                warn!(rpc.method = method, %address, error = %e, "unexpected result shape");
            })
            .ok();
    }
    Ok(slots)
}

/// Unspent outputs per address, aligned with `addresses`.
pub async fn list_unspents(
    rpc: &dyn ElectrumRpc,
    addresses: &[String],
) -> Result<Vec<Option<Vec<AddressUnspent>>>, CoreError> {
    let slots: Vec<Option<Vec<UnspentEntry>>> =
        query_by_script_hash(rpc, LIST_UNSPENT, addresses).await?;
    Ok(slots
        .into_iter()
        .zip(addresses)
        .map(|(slot, address)| {
            slot.map(|entries| {
                entries
                    .into_iter()
                    .map(|entry| AddressUnspent {
                        address: address.clone(),
                        txid: entry.tx_hash,
                        vout_index: entry.tx_pos,
                        value: Amount::from_sat(entry.value),
                        height: entry.height,
                    })
                    .collect()
            })
        })
        .collect())
}

/// Confirmed and unconfirmed balance per address, aligned with `addresses`.
pub async fn get_balances(
    rpc: &dyn ElectrumRpc,
    addresses: &[String],
) -> Result<Vec<Option<AddressBalance>>, CoreError> {
    let slots: Vec<Option<BalanceEntry>> = query_by_script_hash(rpc, GET_BALANCE, addresses).await?;
    Ok(slots
        .into_iter()
        .zip(addresses)
        .map(|(slot, address)| {
            slot.map(|entry| AddressBalance {
                address: address.clone(),
                confirmed: entry.confirmed,
                unconfirmed: entry.unconfirmed,
            })
        })
        .collect())
}

/// The history entries of every address that answered, concatenated in
/// address order.
pub async fn get_histories(
    rpc: &dyn ElectrumRpc,
    addresses: &[String],
) -> Result<Vec<HistoryItem>, CoreError> {
    let slots: Vec<Option<Vec<HistoryEntry>>> =
        query_by_script_hash(rpc, GET_HISTORY, addresses).await?;
    Ok(slots
        .into_iter()
        .flatten()
        .flatten()
        .map(|entry| HistoryItem {
            tx_hash: entry.tx_hash,
            height: entry.height,
        })
        .collect())
}

/// Whether each address has ever appeared on chain, aligned with `addresses`.
pub async fn has_used(
    rpc: &dyn ElectrumRpc,
    addresses: &[String],
) -> Result<Vec<Option<AddressUsed>>, CoreError> {
    let slots: Vec<Option<bool>> = query_by_script_hash(rpc, HAS_USED, addresses).await?;
    Ok(slots
        .into_iter()
        .zip(addresses)
        .map(|(slot, address)| {
            slot.map(|used| AddressUsed {
                address: address.clone(),
                used,
            })
        })
        .collect())
}

// ==============================================================================
// History Ordering and Pagination
// ==============================================================================

/// Unconfirmed entries first in their original order, then confirmed
/// entries by height, highest first. Equal heights keep their order.
#[must_use]
pub fn order_history(items: Vec<HistoryItem>) -> Vec<HistoryItem> {
    let (mut ordered, mut confirmed): (Vec<_>, Vec<_>) =
        items.into_iter().partition(HistoryItem::is_unconfirmed);
    confirmed.sort_by(|a, b| b.height.cmp(&a.height));
    ordered.append(&mut confirmed);
    ordered
}

/// Slice out page `page` (1-based) of `size` items.
///
/// An empty input yields an empty page; otherwise a page starting past the
/// end is a [`CoreError::Range`].
pub fn paginate<T>(items: &[T], page: usize, size: usize) -> Result<&[T], CoreError> {
    check_page(page, size)?;
    if items.is_empty() {
        return Ok(items);
    }

    let offset = (page - 1)
        .checked_mul(size)
        .ok_or_else(|| CoreError::Param(format!("page {page} of size {size} overflows")))?;
    if offset >= items.len() {
        return Err(CoreError::Range {
            offset,
            len: items.len(),
        });
    }
    let end = offset.saturating_add(size).min(items.len());
    Ok(&items[offset..end])
}

fn check_page(page: usize, size: usize) -> Result<(), CoreError> {
    if page < 1 || size < 1 {
        return Err(CoreError::Param(format!(
            "page and size must be at least 1, got page={page} size={size}"
        )));
    }
    Ok(())
}

/// One page of the combined, ordered history of `addresses`, enriched.
///
/// Transactions that cannot be fetched are left out of the page.
pub async fn address_transactions(
    rpc: &dyn ElectrumRpc,
    source: &dyn TxSource,
    addresses: &[String],
    page: usize,
    size: usize,
) -> Result<HistoryPage, CoreError> {
    check_page(page, size)?;

    let history = order_history(get_histories(rpc, addresses).await?);
    let txids: Vec<Txid> = paginate(&history, page, size)?
        .iter()
        .map(|item| item.tx_hash)
        .collect();

    let transactions = enrich_batch(source, &txids).await?.into_iter().flatten().collect();
    Ok(HistoryPage {
        page,
        size,
        transactions,
    })
}
