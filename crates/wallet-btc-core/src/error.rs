use bitcoin::Txid;

/// Wire error numbers shared with wallet clients.
pub mod errno {
    pub const SUCCESS: i64 = 0;
    pub const UNKNOWN: i64 = -1;
    pub const SOCKET: i64 = -2;
    pub const RANGE: i64 = -3;
    pub const PARAM: i64 = -4;
    pub const NETWORK: i64 = -5;
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum CoreError {
    /// The backend could not be reached, or the exchange timed out.
    #[error("socket error: {0}")]
    Socket(String),

    /// An HTTP backend answered with a status other than 200.
    #[error("network request error: HTTP status {status}")]
    Network { status: u16 },

    /// The backend answered with a JSON-RPC `error` object.
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("invalid backend response: {0}")]
    InvalidResponse(String),

    #[error("out of range: offset {offset} is not below {len}")]
    Range { offset: usize, len: usize },

    #[error("invalid params: {0}")]
    Param(String),

    #[error("transaction not found: {0}")]
    TxNotFound(Txid),

    #[error("fee estimate unavailable for a {blocks}-block target")]
    EstimateUnavailable { blocks: u32 },
}

impl CoreError {
    /// Error number reported to wallet clients in the response envelope.
    pub fn errno(&self) -> i64 {
        match self {
            Self::Socket(_) => errno::SOCKET,
            Self::Network { .. } => errno::NETWORK,
            Self::Rpc { code, .. } => *code,
            Self::Range { .. } => errno::RANGE,
            Self::Param(_) => errno::PARAM,
            Self::InvalidResponse(_) | Self::TxNotFound(_) | Self::EstimateUnavailable { .. } => {
                errno::UNKNOWN
            }
        }
    }
}
