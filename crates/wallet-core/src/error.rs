use thiserror::Error;

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("invalid mnemonic: {0}")]
    InvalidMnemonic(String),

    #[error("key derivation failed: {0}")]
    DerivationFailed(String),

    #[error("invalid seed: {0}")]
    InvalidSeed(String),

    #[error("unsupported chain: {0}")]
    UnsupportedChain(String),

    #[error("transaction build failed: {0}")]
    TransactionFailed(String),

    #[error("signing failed: {0}")]
    SigningFailed(String),
}

impl From<chain_params::ParamsError> for WalletError {
    fn from(e: chain_params::ParamsError) -> Self {
        WalletError::UnsupportedChain(e.to_string())
    }
}

impl From<chain_btc::BtcError> for WalletError {
    fn from(e: chain_btc::BtcError) -> Self {
        match e {
            chain_btc::BtcError::SigningError(_) | chain_btc::BtcError::InvalidPrivateKey(_) => {
                WalletError::SigningFailed(format!("BTC: {e}"))
            }
            other => WalletError::TransactionFailed(format!("BTC: {other}")),
        }
    }
}

impl From<chain_eth::EthError> for WalletError {
    fn from(e: chain_eth::EthError) -> Self {
        WalletError::TransactionFailed(format!("ETH: {e}"))
    }
}
