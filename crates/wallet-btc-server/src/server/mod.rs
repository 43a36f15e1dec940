mod address;
mod error;
mod fees;
mod transaction;

use std::sync::Arc;

use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use eyre::WrapErr;
use serde::Serialize;
use tower_http::cors::{AllowOrigin, CorsLayer};

use wallet_btc_core::rpc::{ElectrumRpc, TxSource};
use wallet_btc_core::wallet::FeeMultipliers;

use error::{success, ApiResult, AppError};

// ==============================================================================
// Application State
// ==============================================================================

pub struct AppState {
    pub electrum: Arc<dyn ElectrumRpc>,
    /// Backend used for transaction lookups and input resolution.
    pub source: Arc<dyn TxSource>,
    pub enrich_concurrency: usize,
    pub fee_blocks: u32,
    pub fee_multipliers: FeeMultipliers,
}

type SharedState = Arc<AppState>;

// ==============================================================================
// Router
// ==============================================================================

/// CORS policy for the configured origins; no origins means any origin.
pub fn cors_layer(origins: &[String]) -> eyre::Result<CorsLayer> {
    let allow_origin = if origins.is_empty() {
        AllowOrigin::any()
    } else {
        let values = origins
            .iter()
            .map(|origin| {
                origin
                    .parse::<HeaderValue>()
                    .wrap_err_with(|| format!("invalid CORS origin `{origin}`"))
            })
            .collect::<eyre::Result<Vec<_>>>()?;
        AllowOrigin::list(values)
    };

    Ok(CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]))
}

pub fn build_router(state: AppState, cors: CorsLayer) -> Router {
    let shared = Arc::new(state);

    Router::new()
        .route("/health", get(health))
        .route("/transaction/{txid}", get(transaction::get_transaction))
        .route("/send_raw_transaction", post(transaction::send_raw_transaction))
        .route("/address", post(address::used))
        .route("/address/unspents", post(address::unspents))
        .route("/address/balance", post(address::balance))
        .route("/address/transactions", post(address::transactions))
        .route("/recommended_fee_rates", get(fees::recommended_fee_rates))
        .fallback(not_found)
        .layer(cors)
        .with_state(shared)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

async fn health() -> ApiResult<HealthResponse> {
    success(HealthResponse { status: "ok" })
}

async fn not_found() -> AppError {
    AppError::NotFound
}
