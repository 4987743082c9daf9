use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use crate::params::{ChainFamily, ChainParams, Network};

#[derive(Debug, Error)]
pub enum ParamsError {
    #[error("unknown chain: {symbol} on {network}")]
    UnknownChain { symbol: String, network: Network },

    #[error("duplicate chain registration: {0}")]
    DuplicateChain(String),
}

/// Read-only table of chain parameters, keyed by `(symbol, network)`.
///
/// Built once at process start. Shared across services as `Arc<ChainRegistry>`;
/// there is deliberately no way to mutate it afterwards.
#[derive(Debug)]
pub struct ChainRegistry {
    chains: HashMap<(&'static str, Network), Arc<ChainParams>>,
}

impl ChainRegistry {
    /// Registry with all chains this workspace ships support for.
    pub fn builtin() -> Self {
        let mut chains = HashMap::new();
        for params in builtin_params() {
            chains.insert((params.symbol, params.network), Arc::new(params));
        }
        Self { chains }
    }

    /// Build a registry from an explicit parameter list.
    pub fn from_params(list: Vec<ChainParams>) -> Result<Self, ParamsError> {
        let mut chains = HashMap::new();
        for params in list {
            let key = (params.symbol, params.network);
            if chains.insert(key, Arc::new(params)).is_some() {
                return Err(ParamsError::DuplicateChain(format!(
                    "{} {}",
                    key.0, key.1
                )));
            }
        }
        Ok(Self { chains })
    }

    pub fn get(&self, symbol: &str, network: Network) -> Result<Arc<ChainParams>, ParamsError> {
        self.chains
            .iter()
            .find(|((sym, net), _)| sym.eq_ignore_ascii_case(symbol) && *net == network)
            .map(|(_, params)| Arc::clone(params))
            .ok_or_else(|| ParamsError::UnknownChain {
                symbol: symbol.to_string(),
                network,
            })
    }

    /// All registered parameter sets, in no particular order.
    pub fn all(&self) -> impl Iterator<Item = &Arc<ChainParams>> {
        self.chains.values()
    }
}

fn builtin_params() -> Vec<ChainParams> {
    vec![
        ChainParams {
            symbol: "BTC",
            name: "Bitcoin",
            family: ChainFamily::Utxo,
            network: Network::Mainnet,
            decimals: 8,
            purpose: 84,
            coin_type: 0,
            p2pkh_prefix: 0x00,
            p2sh_prefix: 0x05,
            bech32_hrp: Some("bc"),
            xprv_magic: [0x04, 0x88, 0xad, 0xe4],
            xpub_magic: [0x04, 0x88, 0xb2, 0x1e],
            evm_chain_id: None,
            supports_segwit: true,
            supports_taproot: true,
        },
        ChainParams {
            symbol: "BTC",
            name: "Bitcoin Testnet",
            family: ChainFamily::Utxo,
            network: Network::Testnet,
            decimals: 8,
            purpose: 84,
            coin_type: 1,
            p2pkh_prefix: 0x6f,
            p2sh_prefix: 0xc4,
            bech32_hrp: Some("tb"),
            xprv_magic: [0x04, 0x35, 0x83, 0x94],
            xpub_magic: [0x04, 0x35, 0x87, 0xcf],
            evm_chain_id: None,
            supports_segwit: true,
            supports_taproot: true,
        },
        ChainParams {
            symbol: "LTC",
            name: "Litecoin",
            family: ChainFamily::Utxo,
            network: Network::Mainnet,
            decimals: 8,
            purpose: 84,
            coin_type: 2,
            p2pkh_prefix: 0x30,
            p2sh_prefix: 0x32,
            bech32_hrp: Some("ltc"),
            xprv_magic: [0x04, 0x88, 0xad, 0xe4],
            xpub_magic: [0x04, 0x88, 0xb2, 0x1e],
            evm_chain_id: None,
            supports_segwit: true,
            supports_taproot: false,
        },
        ChainParams {
            symbol: "DOGE",
            name: "Dogecoin",
            family: ChainFamily::Utxo,
            network: Network::Mainnet,
            decimals: 8,
            purpose: 44,
            coin_type: 3,
            p2pkh_prefix: 0x1e,
            p2sh_prefix: 0x16,
            bech32_hrp: None,
            xprv_magic: [0x02, 0xfa, 0xc3, 0x98],
            xpub_magic: [0x02, 0xfa, 0xca, 0xfd],
            evm_chain_id: None,
            supports_segwit: false,
            supports_taproot: false,
        },
        ChainParams {
            symbol: "ETH",
            name: "Ethereum",
            family: ChainFamily::Evm,
            network: Network::Mainnet,
            decimals: 18,
            purpose: 44,
            coin_type: 60,
            p2pkh_prefix: 0,
            p2sh_prefix: 0,
            bech32_hrp: None,
            xprv_magic: [0x04, 0x88, 0xad, 0xe4],
            xpub_magic: [0x04, 0x88, 0xb2, 0x1e],
            evm_chain_id: Some(1),
            supports_segwit: false,
            supports_taproot: false,
        },
        ChainParams {
            symbol: "ETH",
            name: "Ethereum Sepolia",
            family: ChainFamily::Evm,
            network: Network::Testnet,
            decimals: 18,
            purpose: 44,
            coin_type: 60,
            p2pkh_prefix: 0,
            p2sh_prefix: 0,
            bech32_hrp: None,
            xprv_magic: [0x04, 0x88, 0xad, 0xe4],
            xpub_magic: [0x04, 0x88, 0xb2, 0x1e],
            evm_chain_id: Some(11155111),
            supports_segwit: false,
            supports_taproot: false,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_contains_btc_mainnet() {
        let reg = ChainRegistry::builtin();
        let btc = reg.get("BTC", Network::Mainnet).unwrap();
        assert_eq!(btc.coin_type, 0);
        assert_eq!(btc.bech32_hrp, Some("bc"));
        assert!(btc.supports_taproot);
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let reg = ChainRegistry::builtin();
        assert!(reg.get("btc", Network::Mainnet).is_ok());
        assert!(reg.get("Eth", Network::Mainnet).is_ok());
    }

    #[test]
    fn unknown_chain_is_an_error() {
        let reg = ChainRegistry::builtin();
        let err = reg.get("XMR", Network::Mainnet).unwrap_err();
        assert!(matches!(err, ParamsError::UnknownChain { .. }));
    }

    #[test]
    fn testnet_and_mainnet_are_distinct() {
        let reg = ChainRegistry::builtin();
        let main = reg.get("BTC", Network::Mainnet).unwrap();
        let test = reg.get("BTC", Network::Testnet).unwrap();
        assert_ne!(main.p2pkh_prefix, test.p2pkh_prefix);
        assert_eq!(test.bech32_hrp, Some("tb"));
    }

    #[test]
    fn duplicate_registration_rejected() {
        let reg = ChainRegistry::builtin();
        let btc = reg.get("BTC", Network::Mainnet).unwrap();
        let err = ChainRegistry::from_params(vec![(*btc).clone(), (*btc).clone()]).unwrap_err();
        assert!(matches!(err, ParamsError::DuplicateChain(_)));
    }

    #[test]
    fn doge_is_legacy_only() {
        let reg = ChainRegistry::builtin();
        let doge = reg.get("DOGE", Network::Mainnet).unwrap();
        assert!(!doge.supports_segwit);
        assert!(doge.bech32_hrp.is_none());
        assert_eq!(doge.purpose, 44);
    }
}
