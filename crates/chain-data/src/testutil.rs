//! In-memory backend for unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Semaphore;

use crate::backend::Backend;
use crate::error::BackendError;
use crate::types::{
    AddressInfo, BlockHeaderInfo, FeeEstimates, HeaderLocator, TxSummary, UtxoEntry,
};

pub(crate) struct MockBackend {
    pub connected: AtomicBool,
    pub active: Mutex<HashMap<String, AddressInfo>>,
    pub utxos: Mutex<HashMap<String, Vec<UtxoEntry>>>,
    pub queried: Mutex<Vec<String>>,
    pub height: u64,
    /// When set, every utxo query consumes one permit, letting tests hold a
    /// scan mid-flight.
    pub gate: Option<Arc<Semaphore>>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self {
            connected: AtomicBool::new(false),
            active: Mutex::new(HashMap::new()),
            utxos: Mutex::new(HashMap::new()),
            queried: Mutex::new(Vec::new()),
            height: 100,
            gate: None,
        }
    }
}

#[async_trait]
impl Backend for MockBackend {
    async fn connect(&self) -> Result<(), BackendError> {
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> Result<(), BackendError> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn address_info(&self, address: &str) -> Result<AddressInfo, BackendError> {
        Ok(self
            .active
            .lock()
            .unwrap()
            .get(address)
            .cloned()
            .unwrap_or_else(|| AddressInfo {
                address: address.to_string(),
                ..Default::default()
            }))
    }

    async fn address_utxos(&self, address: &str) -> Result<Vec<UtxoEntry>, BackendError> {
        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }
        self.queried.lock().unwrap().push(address.to_string());
        Ok(self
            .utxos
            .lock()
            .unwrap()
            .get(address)
            .cloned()
            .unwrap_or_default())
    }

    async fn address_txs(
        &self,
        _address: &str,
        _cursor: Option<&str>,
    ) -> Result<Vec<TxSummary>, BackendError> {
        Ok(Vec::new())
    }

    async fn transaction(&self, txid: &str) -> Result<TxSummary, BackendError> {
        Err(BackendError::NotFound(txid.to_string()))
    }

    async fn raw_transaction(&self, txid: &str) -> Result<Vec<u8>, BackendError> {
        Err(BackendError::NotFound(txid.to_string()))
    }

    async fn broadcast(&self, _raw_hex: &str) -> Result<String, BackendError> {
        Ok("ff".repeat(32))
    }

    async fn block_height(&self) -> Result<u64, BackendError> {
        Ok(self.height)
    }

    async fn block_header(
        &self,
        _locator: HeaderLocator,
    ) -> Result<BlockHeaderInfo, BackendError> {
        Err(BackendError::Unsupported("mock has no headers".into()))
    }

    async fn fee_estimates(&self) -> Result<FeeEstimates, BackendError> {
        Ok(FeeEstimates::default())
    }
}
