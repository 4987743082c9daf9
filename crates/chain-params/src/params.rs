use serde::{Deserialize, Serialize};

/// Whether a chain tracks value as spendable outputs or account balances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChainFamily {
    Utxo,
    Evm,
}

/// Mainnet or testnet flavor of a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Network {
    Mainnet,
    Testnet,
}

impl std::fmt::Display for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Network::Mainnet => write!(f, "mainnet"),
            Network::Testnet => write!(f, "testnet"),
        }
    }
}

/// Static constants for one chain on one network.
///
/// Registered once at startup through [`crate::ChainRegistry`] and looked up
/// by `(symbol, network)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainParams {
    /// Ticker symbol, e.g. "BTC".
    pub symbol: &'static str,
    /// Human-readable chain name.
    pub name: &'static str,
    pub family: ChainFamily,
    pub network: Network,
    /// Decimal precision of the smallest unit (8 for sat, 18 for wei).
    pub decimals: u8,
    /// BIP-44 purpose level (44, 49, 84, 86 ...).
    pub purpose: u32,
    /// BIP-44 coin type.
    pub coin_type: u32,
    /// Base58check version byte for P2PKH addresses.
    pub p2pkh_prefix: u8,
    /// Base58check version byte for P2SH addresses.
    pub p2sh_prefix: u8,
    /// Bech32 human-readable part, if the chain supports witness addresses.
    pub bech32_hrp: Option<&'static str>,
    /// BIP-32 extended private key magic bytes.
    pub xprv_magic: [u8; 4],
    /// BIP-32 extended public key magic bytes.
    pub xpub_magic: [u8; 4],
    /// EIP-155 chain id for EVM chains.
    pub evm_chain_id: Option<u64>,
    pub supports_segwit: bool,
    pub supports_taproot: bool,
}

impl ChainParams {
    /// True for chains where balances live in unspent outputs.
    pub fn is_utxo(&self) -> bool {
        self.family == ChainFamily::Utxo
    }

    /// True for account-model (EVM) chains.
    pub fn is_evm(&self) -> bool {
        self.family == ChainFamily::Evm
    }

    /// Derivation purpose actually used for a given script preference.
    ///
    /// Taproot chains derive under 86', segwit chains under 84'; everything
    /// else falls back to the registered purpose (44' for legacy chains).
    pub fn purpose_for_taproot(&self, taproot: bool) -> u32 {
        if taproot && self.supports_taproot {
            86
        } else {
            self.purpose
        }
    }
}
