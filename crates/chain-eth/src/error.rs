use thiserror::Error;

/// EVM-chain engine errors.
#[derive(Debug, Error)]
pub enum EthError {
    #[error("invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("invalid quantity: {0}")]
    InvalidQuantity(String),

    #[error("encoding error: {0}")]
    EncodingError(String),

    #[error("signing error: {0}")]
    SigningError(String),
}
