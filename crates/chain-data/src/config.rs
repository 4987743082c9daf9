//! Backend configuration, one entry per chain symbol.

use std::time::Duration;

use serde::Deserialize;

use chain_params::Network;

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Which protocol client to construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Esplora,
    Blockbook,
    Electrum,
    NodeRpc,
}

/// Call convention for the node-RPC variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeDialect {
    #[default]
    Utxo,
    Evm,
}

/// One Electrum server candidate.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ElectrumServer {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub tls: bool,
}

/// Configuration for one chain's backend.
#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    pub symbol: String,
    #[serde(default = "default_network")]
    pub network: Network,
    pub kind: BackendKind,
    /// Base URL for the REST and node-RPC variants.
    #[serde(default)]
    pub url: Option<String>,
    /// Candidate server list for the Electrum variant, tried in order.
    #[serde(default)]
    pub servers: Vec<ElectrumServer>,
    /// Basic-auth credentials for node RPC.
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub dialect: NodeDialect,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_network() -> Network {
    Network::Mainnet
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl BackendConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rest_config_from_json() {
        let config: BackendConfig = serde_json::from_str(
            r#"{"symbol": "BTC", "kind": "esplora", "url": "https://blockstream.info/api"}"#,
        )
        .unwrap();
        assert_eq!(config.kind, BackendKind::Esplora);
        assert_eq!(config.network, Network::Mainnet);
        assert_eq!(config.timeout_secs, 30);
        assert!(config.servers.is_empty());
    }

    #[test]
    fn electrum_config_from_json() {
        let config: BackendConfig = serde_json::from_str(
            r#"{
                "symbol": "LTC",
                "kind": "electrum",
                "servers": [
                    {"host": "a.example", "port": 50001},
                    {"host": "b.example", "port": 50002, "tls": true}
                ],
                "timeout_secs": 10
            }"#,
        )
        .unwrap();
        assert_eq!(config.servers.len(), 2);
        assert!(!config.servers[0].tls);
        assert!(config.servers[1].tls);
        assert_eq!(config.timeout(), Duration::from_secs(10));
    }

    #[test]
    fn node_dialect_defaults_to_utxo() {
        let config: BackendConfig = serde_json::from_str(
            r#"{"symbol": "DOGE", "kind": "node_rpc", "url": "http://127.0.0.1:22555"}"#,
        )
        .unwrap();
        assert_eq!(config.dialect, NodeDialect::Utxo);

        let config: BackendConfig = serde_json::from_str(
            r#"{"symbol": "ETH", "kind": "node_rpc", "url": "http://127.0.0.1:8545",
                "dialect": "evm"}"#,
        )
        .unwrap();
        assert_eq!(config.dialect, NodeDialect::Evm);
    }
}
