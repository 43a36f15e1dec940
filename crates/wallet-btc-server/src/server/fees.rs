use axum::extract::State;

use wallet_btc_core::types::FeeRate;
use wallet_btc_core::wallet::estimate_fee_rates;

use super::error::{success, ApiResult};
use super::SharedState;

pub(super) async fn recommended_fee_rates(
    State(state): State<SharedState>,
) -> ApiResult<Vec<FeeRate>> {
    let rates =
        estimate_fee_rates(state.electrum.as_ref(), state.fee_blocks, state.fee_multipliers)
            .await?;
    success(rates)
}
