//! Transaction enrichment.
//!
//! Turns backend transactions into [`EnrichedTransaction`]s by resolving
//! every input against the transaction that funded it, then computing the
//! fee and formatting the block time. Resolution failures never abort
//! enrichment: the affected inputs are left without address and value.

use std::collections::{HashMap, HashSet};

use bitcoin::{Amount, OutPoint, Txid};
use futures::future::join_all;
use futures::StreamExt;
use time::macros::format_description;
use time::OffsetDateTime;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::error::CoreError;
use crate::rpc::TxSource;
use crate::types::{EnrichedInput, EnrichedOutput, EnrichedTransaction, RawTransaction};

/// Previous transactions are fetched in batches of at most this many ids.
pub const PREV_TX_PAGE_SIZE: usize = 20;

/// Previous-transaction pages in flight at once during [`enrich_batch`].
const PREV_TX_PAGE_CONCURRENCY: usize = 4;

// ==============================================================================
// Fee and Block Time
// ==============================================================================

/// Compute the fee as sum(inputs) - sum(outputs).
///
/// Returns `None` if any input is unresolved, or if the outputs exceed the
/// inputs.
#[must_use]
pub fn compute_fee(inputs: &[EnrichedInput], outputs: &[EnrichedOutput]) -> Option<Amount> {
    let total_in = inputs
        .iter()
        .try_fold(Amount::ZERO, |acc, input| acc.checked_add(input.value?))?;

    let total_out = outputs
        .iter()
        .try_fold(Amount::ZERO, |acc, output| acc.checked_add(output.value))?;

    total_in.checked_sub(total_out)
}

/// Format a Unix timestamp as `YYYY-MM-DDTHH:MM:SS+0000` in UTC.
#[must_use]
pub fn format_block_time(unix_secs: i64) -> Option<String> {
    OffsetDateTime::from_unix_timestamp(unix_secs)
        .ok()?
        .format(format_description!(
            "[year]-[month]-[day]T[hour]:[minute]:[second]+0000"
        ))
        .ok()
}

// ==============================================================================
// Assembly
// ==============================================================================

/// Build the enriched record for `raw`, reading spent outputs from `prev`.
///
/// A coinbase transaction has no inputs and a zero fee.
pub fn assemble(raw: &RawTransaction, prev: &HashMap<Txid, RawTransaction>) -> EnrichedTransaction {
    let is_coinbase = raw.is_coinbase();

    let inputs: Vec<EnrichedInput> = if is_coinbase {
        Vec::new()
    } else {
        raw.inputs
            .iter()
            .filter_map(|input| input.prevout)
            .map(|outpoint| resolve_input(outpoint, prev))
            .collect()
    };

    let outputs: Vec<EnrichedOutput> = raw
        .outputs
        .iter()
        .enumerate()
        .map(|(index, output)| EnrichedOutput {
            to_address: output.address.clone(),
            vout_index: index as u32,
            value: output.value,
            script_type: output.script_type.clone(),
            script_asm: output.script_asm.clone(),
        })
        .collect();

    let fee = if is_coinbase {
        Some(Amount::ZERO)
    } else {
        compute_fee(&inputs, &outputs)
    };

    EnrichedTransaction {
        txid: raw.txid,
        block_hash: raw.block_hash,
        is_coinbase,
        fee,
        inputs,
        outputs,
        confirmations: raw.confirmations,
        block_time_utc: raw.block_time.and_then(format_block_time),
    }
}

fn resolve_input(outpoint: OutPoint, prev: &HashMap<Txid, RawTransaction>) -> EnrichedInput {
    let funding = prev
        .get(&outpoint.txid)
        .and_then(|tx| tx.outputs.get(outpoint.vout as usize));
    EnrichedInput {
        from_address: funding.and_then(|output| output.address.clone()),
        from_txid: outpoint.txid,
        vout_index: outpoint.vout,
        value: funding.map(|output| output.value),
    }
}

/// Distinct funding txids referenced by `txs`, in first-seen order.
pub fn distinct_prev_txids<'a>(txs: impl IntoIterator<Item = &'a RawTransaction>) -> Vec<Txid> {
    let mut seen = HashSet::new();
    txs.into_iter()
        .flat_map(|tx| tx.inputs.iter().filter_map(|input| input.prevout))
        .map(|outpoint| outpoint.txid)
        .filter(|txid| seen.insert(*txid))
        .collect()
}

// ==============================================================================
// Single Transaction
// ==============================================================================

/// Fetch and enrich one transaction.
///
/// Funding transactions are fetched concurrently, at most `concurrency` at
/// a time. Only the lookup of `txid` itself can fail the call.
pub async fn enrich(
    source: &dyn TxSource,
    txid: &Txid,
    concurrency: usize,
) -> Result<EnrichedTransaction, CoreError> {
    let raw = source.get_transaction(txid).await?;
    if raw.is_coinbase() {
        return Ok(assemble(&raw, &HashMap::new()));
    }

    let semaphore = Semaphore::new(concurrency.max(1));
    let prev_ids = distinct_prev_txids(std::iter::once(&raw));
    debug!(%txid, prev_count = prev_ids.len(), "resolving funding transactions");

    let fetched = join_all(
        prev_ids
            .iter()
            .map(|prev_txid| fetch_funding(source, &semaphore, prev_txid)),
    )
    .await;
    let prev: HashMap<Txid, RawTransaction> = fetched
        .into_iter()
        .flatten()
        .map(|tx| (tx.txid, tx))
        .collect();

    Ok(assemble(&raw, &prev))
}

async fn fetch_funding(
    source: &dyn TxSource,
    semaphore: &Semaphore,
    txid: &Txid,
) -> Option<RawTransaction> {
    let _permit = semaphore.acquire().await.ok()?;
    match source.get_transaction(txid).await {
        Ok(tx) => Some(tx),
        Err(e) => {
            warn!(%txid, error = %e, "funding transaction lookup failed; input stays unresolved");
            None
        }
    }
}

// ==============================================================================
// Batch
// ==============================================================================

/// Fetch and enrich many transactions.
///
/// The result is aligned with `txids`; a slot is `None` when that
/// transaction could not be fetched. Funding transactions are fetched in
/// pages of [`PREV_TX_PAGE_SIZE`]; a failed page only leaves its inputs
/// unresolved.
pub async fn enrich_batch(
    source: &dyn TxSource,
    txids: &[Txid],
) -> Result<Vec<Option<EnrichedTransaction>>, CoreError> {
    if txids.is_empty() {
        return Ok(Vec::new());
    }

    let fetched = source.get_transactions(txids).await?;
    if fetched.len() != txids.len() {
        return Err(CoreError::InvalidResponse(format!(
            "requested {} transactions, backend returned {}",
            txids.len(),
            fetched.len()
        )));
    }

    let prev_ids = distinct_prev_txids(fetched.iter().flatten());
    debug!(
        tx_count = txids.len(),
        prev_count = prev_ids.len(),
        "resolving funding transactions in pages"
    );

    let pages: Vec<Vec<Txid>> = prev_ids.chunks(PREV_TX_PAGE_SIZE).map(<[Txid]>::to_vec).collect();
    let mut pages = futures::stream::iter(pages)
        .map(move |page| async move {
            let result = source.get_transactions(&page).await;
            (page, result)
        })
        .buffer_unordered(PREV_TX_PAGE_CONCURRENCY);

    let mut prev: HashMap<Txid, RawTransaction> = HashMap::with_capacity(prev_ids.len());
    while let Some((page, result)) = pages.next().await {
        match result {
            Ok(txs) => prev.extend(txs.into_iter().flatten().map(|tx| (tx.txid, tx))),
            Err(e) => warn!(
                page_len = page.len(),
                error = %e,
                "funding transaction page failed; its inputs stay unresolved"
            ),
        }
    }

    Ok(fetched
        .iter()
        .map(|slot| slot.as_ref().map(|raw| assemble(raw, &prev)))
        .collect())
}
