//! The backend capability set and the per-symbol registry.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use chain_params::ChainRegistry;

use crate::blockbook::BlockbookBackend;
use crate::config::{BackendConfig, BackendKind};
use crate::electrum::ElectrumBackend;
use crate::error::BackendError;
use crate::esplora::EsploraBackend;
use crate::node::NodeRpcBackend;
use crate::types::{
    AddressInfo, BlockHeaderInfo, FeeEstimates, HeaderLocator, TxSummary, UtxoEntry,
};

/// Uniform contract over every protocol client variant.
///
/// Object-safe so the registry can hold heterogeneous backends. All
/// amounts returned are normalized smallest units; all fee rates sat/vB.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn connect(&self) -> Result<(), BackendError>;
    async fn close(&self) -> Result<(), BackendError>;
    /// Cheap concurrent read; never blocks behind an in-flight request.
    fn is_connected(&self) -> bool;

    async fn address_info(&self, address: &str) -> Result<AddressInfo, BackendError>;
    async fn address_utxos(&self, address: &str) -> Result<Vec<UtxoEntry>, BackendError>;
    /// Transaction history page; `cursor` is the last txid of the previous
    /// page for providers that paginate.
    async fn address_txs(
        &self,
        address: &str,
        cursor: Option<&str>,
    ) -> Result<Vec<TxSummary>, BackendError>;

    async fn transaction(&self, txid: &str) -> Result<TxSummary, BackendError>;
    async fn raw_transaction(&self, txid: &str) -> Result<Vec<u8>, BackendError>;
    /// Broadcast raw hex; returns the txid as reported by the network.
    async fn broadcast(&self, raw_hex: &str) -> Result<String, BackendError>;

    async fn block_height(&self) -> Result<u64, BackendError>;
    async fn block_header(&self, locator: HeaderLocator) -> Result<BlockHeaderInfo, BackendError>;
    async fn fee_estimates(&self) -> Result<FeeEstimates, BackendError>;
}

/// One backend per chain symbol.
pub struct BackendRegistry {
    backends: HashMap<String, Arc<dyn Backend>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self {
            backends: HashMap::new(),
        }
    }

    /// Construct every configured backend. Chain parameters are resolved
    /// through the chain registry where a variant needs them.
    pub fn from_configs(
        chains: &ChainRegistry,
        configs: Vec<BackendConfig>,
    ) -> Result<Self, BackendError> {
        let mut registry = Self::new();
        for config in configs {
            let backend: Arc<dyn Backend> = match config.kind {
                BackendKind::Esplora => Arc::new(EsploraBackend::new(&config)?),
                BackendKind::Blockbook => Arc::new(BlockbookBackend::new(&config)?),
                BackendKind::Electrum => {
                    let params = chains
                        .get(&config.symbol, config.network)
                        .map_err(|e| BackendError::Config(e.to_string()))?;
                    Arc::new(ElectrumBackend::new(&config, params)?)
                }
                BackendKind::NodeRpc => Arc::new(NodeRpcBackend::new(&config)?),
            };
            registry.insert(&config.symbol, backend)?;
        }
        Ok(registry)
    }

    pub fn insert(
        &mut self,
        symbol: &str,
        backend: Arc<dyn Backend>,
    ) -> Result<(), BackendError> {
        let key = symbol.to_uppercase();
        if self.backends.contains_key(&key) {
            return Err(BackendError::Config(format!(
                "duplicate backend for {key}"
            )));
        }
        self.backends.insert(key, backend);
        Ok(())
    }

    pub fn get(&self, symbol: &str) -> Result<Arc<dyn Backend>, BackendError> {
        self.backends
            .get(&symbol.to_uppercase())
            .cloned()
            .ok_or_else(|| BackendError::UnknownBackend(symbol.to_string()))
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.backends.keys().map(String::as_str)
    }

    /// Connect every backend, attempting all of them before reporting the
    /// first failure.
    pub async fn connect_all(&self) -> Result<(), BackendError> {
        let mut first_error = None;
        for (symbol, backend) in &self.backends {
            if let Err(e) = backend.connect().await {
                tracing::warn!(%symbol, error = %e, "backend connect failed");
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Close every backend; close failures are logged, not propagated.
    pub async fn close_all(&self) {
        for (symbol, backend) in &self.backends {
            if let Err(e) = backend.close().await {
                tracing::warn!(%symbol, error = %e, "backend close failed");
            }
        }
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}
