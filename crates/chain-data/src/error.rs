use thiserror::Error;

/// Chain data layer errors, shared by every backend variant and the sync
/// service.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend not connected")]
    NotConnected,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("rate limited by provider")]
    RateLimited,

    #[error("transport error (status {status}): {body}")]
    Transport { status: u16, body: String },

    #[error("io error: {0}")]
    Io(String),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("broadcast failed: {0}")]
    Broadcast(String),

    #[error("invalid transaction: {0}")]
    InvalidTransaction(String),

    #[error("operation not supported: {0}")]
    Unsupported(String),

    #[error("no backend registered for {0}")]
    UnknownBackend(String),

    #[error("sync already running for {0}")]
    SyncInProgress(String),

    #[error("address derivation failed: {0}")]
    Derivation(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl From<std::io::Error> for BackendError {
    fn from(e: std::io::Error) -> Self {
        BackendError::Io(e.to_string())
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(e: reqwest::Error) -> Self {
        if let Some(status) = e.status() {
            BackendError::Transport {
                status: status.as_u16(),
                body: e.to_string(),
            }
        } else {
            BackendError::Io(e.to_string())
        }
    }
}

impl From<serde_json::Error> for BackendError {
    fn from(e: serde_json::Error) -> Self {
        BackendError::Decode(e.to_string())
    }
}

impl From<chain_btc::BtcError> for BackendError {
    fn from(e: chain_btc::BtcError) -> Self {
        BackendError::Decode(e.to_string())
    }
}

impl From<wallet_core::WalletError> for BackendError {
    fn from(e: wallet_core::WalletError) -> Self {
        BackendError::Derivation(e.to_string())
    }
}
