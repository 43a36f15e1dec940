//! Notification fan-out for newly observed mempool transactions.
//!
//! New transactions are enriched, their input and output addresses are
//! matched against the subscriber directory, and every match becomes one
//! [`PushEvent`]. All events of one cycle go out in a single push.

mod http;

pub use http::HubClient;

use std::sync::Arc;

use async_trait::async_trait;
use bitcoin::Txid;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::enrich::{enrich, enrich_batch, PREV_TX_PAGE_SIZE};
use crate::error::CoreError;
use crate::rpc::TxSource;
use crate::types::{DirectoryEntry, EnrichedTransaction, MsgType, PushEvent};

pub const TOKEN_NAME: &str = "BTC";

/// The notify hub: subscriber directory and push endpoint.
#[async_trait]
pub trait NotifyHub: Send + Sync {
    async fn fetch_directory(&self) -> Result<Vec<DirectoryEntry>, CoreError>;

    async fn push(&self, events: &[PushEvent]) -> Result<(), CoreError>;
}

/// Stable event id: message type, then txid, then index.
pub fn msg_id(kind: MsgType, txid: &Txid, index: u32) -> String {
    format!("{}{txid}{index}", u8::from(kind))
}

fn event(entry: &DirectoryEntry, kind: MsgType, msg_id: String) -> PushEvent {
    PushEvent {
        chain_type: entry.chain_type.clone(),
        chain_id: entry.chain_id.clone(),
        msg_type: kind,
        cid: entry.cid.clone(),
        msg_id,
        language: entry.language.clone(),
        token_name: TOKEN_NAME.to_owned(),
        name: entry.name.clone(),
        platform: entry.platform.clone(),
    }
}

/// Match every input (spend) and then every output (receive) of each
/// transaction against `directory`. Inputs and outputs without an address
/// never match.
pub fn build_push_events(
    transactions: &[EnrichedTransaction],
    directory: &[DirectoryEntry],
) -> Vec<PushEvent> {
    let mut events = Vec::new();
    for tx in transactions {
        for input in &tx.inputs {
            let Some(address) = input.from_address.as_deref() else {
                continue;
            };
            for entry in directory.iter().filter(|entry| entry.name == address) {
                let id = msg_id(MsgType::Spend, &input.from_txid, input.vout_index);
                events.push(event(entry, MsgType::Spend, id));
            }
        }
        for output in &tx.outputs {
            let Some(address) = output.to_address.as_deref() else {
                continue;
            };
            for entry in directory.iter().filter(|entry| entry.name == address) {
                let id = msg_id(MsgType::Receive, &tx.txid, output.vout_index);
                events.push(event(entry, MsgType::Receive, id));
            }
        }
    }
    events
}

/// Enrich `added`, match against `directory` and push the matches.
///
/// Returns the number of events pushed. `added` is enriched in pages of
/// [`PREV_TX_PAGE_SIZE`]; when a page fails as a whole its transactions
/// are retried one by one, and those that still fail are skipped. A failed
/// push is logged with its full payload so it can be replayed by hand; it
/// is not retried.
pub async fn notify_new_transactions(
    source: &dyn TxSource,
    hub: &dyn NotifyHub,
    added: &[Txid],
    directory: &[DirectoryEntry],
) -> Result<usize, CoreError> {
    let transactions = enrich_new_transactions(source, added).await;
    if transactions.len() < added.len() {
        warn!(
            requested = added.len(),
            resolved = transactions.len(),
            "some new mempool transactions could not be resolved"
        );
    }

    let events = build_push_events(&transactions, directory);
    if events.is_empty() {
        debug!(tx_count = transactions.len(), "no subscriber matches");
        return Ok(0);
    }

    let payload = serde_json::to_string(&events).unwrap_or_default();
    if let Err(e) = hub.push(&events).await {
        error!(error = %e, push_list = %payload, "push to notify hub failed");
        return Err(e);
    }
    info!(event_count = events.len(), push_list = %payload, "pushed notifications");
    Ok(events.len())
}

async fn enrich_new_transactions(
    source: &dyn TxSource,
    added: &[Txid],
) -> Vec<EnrichedTransaction> {
    let mut transactions = Vec::with_capacity(added.len());
    for page in added.chunks(PREV_TX_PAGE_SIZE) {
        match enrich_batch(source, page).await {
            Ok(slots) => transactions.extend(slots.into_iter().flatten()),
            Err(e) => {
                warn!(
                    page_len = page.len(),
                    error = %e,
                    "new transaction page failed; enriching one by one"
                );
                for txid in page {
                    match enrich(source, txid, 1).await {
                        Ok(tx) => transactions.push(tx),
                        Err(e) => debug!(%txid, error = %e, "new transaction skipped"),
                    }
                }
            }
        }
    }
    transactions
}

/// Run [`notify_new_transactions`] as an independent task that owns its
/// error reporting.
pub fn spawn_fanout(
    source: Arc<dyn TxSource>,
    hub: Arc<dyn NotifyHub>,
    added: Vec<Txid>,
    directory: Vec<DirectoryEntry>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        match notify_new_transactions(source.as_ref(), hub.as_ref(), &added, &directory).await {
            Ok(count) => debug!(added = added.len(), pushed = count, "fan-out finished"),
            Err(e) => error!(added = added.len(), error = %e, "fan-out failed"),
        }
    })
}
