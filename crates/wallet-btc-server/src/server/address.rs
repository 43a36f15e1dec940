use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use wallet_btc_core::resolver::{address_transactions, get_balances, has_used, list_unspents};
use wallet_btc_core::scripthash::filter_valid_addresses;
use wallet_btc_core::types::AddressUsed;

use super::error::{success, ApiResult, AppError};
use super::transaction::TransactionResponse;
use super::SharedState;

// ==============================================================================
// DTOs
// ==============================================================================

#[derive(Serialize)]
pub(super) struct UnspentResponse {
    address: String,
    txid: String,
    vout_index: u32,
    value: u64,
}

#[derive(Serialize)]
pub(super) struct BalanceResponse {
    address: String,
    /// Confirmed plus unconfirmed satoshis.
    balance: i64,
}

#[derive(Deserialize)]
pub(super) struct TransactionsRequest {
    addresses: Vec<String>,
    page: usize,
    size: usize,
}

#[derive(Serialize)]
pub(super) struct Pagination {
    page: usize,
    size: usize,
}

#[derive(Serialize)]
pub(super) struct TransactionsResponse {
    pagination: Pagination,
    list: Vec<TransactionResponse>,
}

// ==============================================================================
// Handlers
// ==============================================================================

/// Parse the address list body and drop syntactically invalid entries.
fn valid_addresses(
    payload: Result<Json<Vec<String>>, JsonRejection>,
) -> Result<Vec<String>, AppError> {
    let Json(addresses) = payload?;
    Ok(filter_valid_addresses(addresses))
}

pub(super) async fn unspents(
    State(state): State<SharedState>,
    payload: Result<Json<Vec<String>>, JsonRejection>,
) -> ApiResult<Vec<UnspentResponse>> {
    let addresses = valid_addresses(payload)?;
    let slots = list_unspents(state.electrum.as_ref(), &addresses).await?;

    let list = slots
        .into_iter()
        .flatten()
        .flatten()
        .map(|utxo| UnspentResponse {
            address: utxo.address,
            txid: utxo.txid.to_string(),
            vout_index: utxo.vout_index,
            value: utxo.value.to_sat(),
        })
        .collect();
    success(list)
}

pub(super) async fn balance(
    State(state): State<SharedState>,
    payload: Result<Json<Vec<String>>, JsonRejection>,
) -> ApiResult<Vec<Option<BalanceResponse>>> {
    let addresses = valid_addresses(payload)?;
    let slots = get_balances(state.electrum.as_ref(), &addresses).await?;

    let list = slots
        .into_iter()
        .map(|slot| {
            slot.map(|b| BalanceResponse {
                balance: b.total(),
                address: b.address,
            })
        })
        .collect();
    success(list)
}

pub(super) async fn transactions(
    State(state): State<SharedState>,
    payload: Result<Json<TransactionsRequest>, JsonRejection>,
) -> ApiResult<TransactionsResponse> {
    let Json(request) = payload?;
    let addresses = filter_valid_addresses(request.addresses);

    let page = address_transactions(
        state.electrum.as_ref(),
        state.source.as_ref(),
        &addresses,
        request.page,
        request.size,
    )
    .await?;

    success(TransactionsResponse {
        pagination: Pagination {
            page: page.page,
            size: page.size,
        },
        list: page.transactions.iter().map(TransactionResponse::from).collect(),
    })
}

pub(super) async fn used(
    State(state): State<SharedState>,
    payload: Result<Json<Vec<String>>, JsonRejection>,
) -> ApiResult<Vec<Option<AddressUsed>>> {
    let addresses = valid_addresses(payload)?;
    success(has_used(state.electrum.as_ref(), &addresses).await?)
}
