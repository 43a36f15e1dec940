use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use wallet_btc_core::error::errno;
use wallet_btc_core::CoreError;

// ==============================================================================
// Envelope
// ==============================================================================

/// `{errno, errmsg, data}` wrapper every route answers with.
#[derive(Serialize)]
pub(super) struct Envelope<T> {
    errno: i64,
    errmsg: String,
    data: T,
}

pub(super) type ApiResult<T> = Result<Json<Envelope<T>>, AppError>;

pub(super) fn success<T: Serialize>(data: T) -> ApiResult<T> {
    Ok(Json(Envelope {
        errno: errno::SUCCESS,
        errmsg: "success".to_owned(),
        data,
    }))
}

// ==============================================================================
// Error Type
// ==============================================================================

pub(crate) enum AppError {
    Core(CoreError),
    NotFound,
}

impl From<CoreError> for AppError {
    fn from(err: CoreError) -> Self {
        Self::Core(err)
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Core(CoreError::Param(rejection.body_text()))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, errno, errmsg) = match self {
            // Backend protocol errors pass through with the backend's own text.
            Self::Core(CoreError::Rpc { code, message }) => (StatusCode::OK, code, message),
            Self::Core(err) => {
                tracing::warn!(errno = err.errno(), error = %err, "request failed");
                (StatusCode::OK, err.errno(), err.to_string())
            }
            Self::NotFound => (StatusCode::NOT_FOUND, errno::UNKNOWN, "route not found".to_owned()),
        };

        let body = Envelope {
            errno,
            errmsg,
            data: serde_json::json!({}),
        };
        (status, Json(body)).into_response()
    }
}
