//! Gap-limit wallet discovery over any backend.
//!
//! Walks the external then internal chains of an HD account, querying each
//! address until `gap_limit` consecutive unused addresses are seen, and
//! collects the spendable coins it finds along the way.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use chain_btc::coin::{AddressUtxo, Utxo};
use chain_btc::ScriptType;
use chain_params::ChainParams;
use wallet_core::KeySource;

use crate::backend::BackendRegistry;
use crate::error::BackendError;
use crate::types::UtxoEntry;

pub const DEFAULT_GAP_LIMIT: u32 = 20;

/// Produces the addresses and scripts of one account, in derivation order.
pub trait AddressSource: Send + Sync {
    fn address_at(&self, change: u32, index: u32) -> Result<String, BackendError>;
    fn script_at(&self, change: u32, index: u32) -> Result<Vec<u8>, BackendError>;
    fn script_type(&self) -> ScriptType;
    fn account(&self) -> u32;
}

/// [`AddressSource`] backed by an HD key source.
pub struct WalletAddressSource {
    params: Arc<ChainParams>,
    keys: Arc<dyn KeySource>,
    script_type: ScriptType,
    account: u32,
}

impl WalletAddressSource {
    pub fn new(
        params: Arc<ChainParams>,
        keys: Arc<dyn KeySource>,
        script_type: ScriptType,
        account: u32,
    ) -> Self {
        Self {
            params,
            keys,
            script_type,
            account,
        }
    }
}

impl AddressSource for WalletAddressSource {
    fn address_at(&self, change: u32, index: u32) -> Result<String, BackendError> {
        wallet_core::wallet_address(
            &self.params,
            self.keys.as_ref(),
            self.script_type,
            self.account,
            change,
            index,
        )
        .map_err(Into::into)
    }

    fn script_at(&self, change: u32, index: u32) -> Result<Vec<u8>, BackendError> {
        wallet_core::wallet_script(
            &self.params,
            self.keys.as_ref(),
            self.script_type,
            self.account,
            change,
            index,
        )
        .map_err(Into::into)
    }

    fn script_type(&self) -> ScriptType {
        self.script_type
    }

    fn account(&self) -> u32 {
        self.account
    }
}

/// Durable scan position, restored on the next startup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCursor {
    pub last_external: Option<u32>,
    pub last_internal: Option<u32>,
    pub block_height: u64,
}

/// Persists scan cursors between runs.
#[async_trait]
pub trait SyncStore: Send + Sync {
    async fn save_cursor(&self, symbol: &str, cursor: &SyncCursor) -> Result<(), BackendError>;
}

/// Result of one full account scan.
#[derive(Debug, Clone)]
pub struct SyncReport {
    pub symbol: String,
    pub last_external: Option<u32>,
    pub last_internal: Option<u32>,
    pub utxos: Vec<AddressUtxo>,
    pub block_height: u64,
    pub addresses_scanned: u32,
}

impl SyncReport {
    pub fn balance_sat(&self) -> u64 {
        self.utxos.iter().map(AddressUtxo::amount_sat).sum()
    }

    pub fn cursor(&self) -> SyncCursor {
        SyncCursor {
            last_external: self.last_external,
            last_internal: self.last_internal,
            block_height: self.block_height,
        }
    }
}

pub struct SyncService {
    registry: Arc<BackendRegistry>,
    store: Option<Arc<dyn SyncStore>>,
    gap_limit: u32,
    in_flight: Mutex<HashSet<String>>,
}

/// Removes the symbol from the in-flight set when the scan ends, on any path.
struct FlightGuard<'a> {
    service: &'a SyncService,
    symbol: String,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.service
            .lock_in_flight()
            .remove(&self.symbol);
    }
}

impl SyncService {
    pub fn new(registry: Arc<BackendRegistry>) -> Self {
        Self {
            registry,
            store: None,
            gap_limit: DEFAULT_GAP_LIMIT,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn with_store(mut self, store: Arc<dyn SyncStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_gap_limit(mut self, gap_limit: u32) -> Self {
        self.gap_limit = gap_limit.max(1);
        self
    }

    fn lock_in_flight(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        match self.in_flight.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Scan one account. A second scan of the same symbol while this one
    /// runs fails fast with `SyncInProgress`.
    pub async fn sync(
        &self,
        symbol: &str,
        source: &dyn AddressSource,
    ) -> Result<SyncReport, BackendError> {
        let key = symbol.to_uppercase();
        {
            let mut in_flight = self.lock_in_flight();
            if !in_flight.insert(key.clone()) {
                return Err(BackendError::SyncInProgress(key));
            }
        }
        let _guard = FlightGuard {
            service: self,
            symbol: key.clone(),
        };

        let backend = self.registry.get(symbol)?;
        let block_height = backend.block_height().await?;

        let mut report = SyncReport {
            symbol: key.clone(),
            last_external: None,
            last_internal: None,
            utxos: Vec::new(),
            block_height,
            addresses_scanned: 0,
        };

        for change in [0u32, 1u32] {
            let last_used = self
                .scan_chain(backend.as_ref(), source, change, &mut report)
                .await?;
            if change == 0 {
                report.last_external = last_used;
            } else {
                report.last_internal = last_used;
            }
        }

        tracing::info!(
            symbol = %key,
            utxos = report.utxos.len(),
            balance = report.balance_sat(),
            scanned = report.addresses_scanned,
            "account sync complete"
        );

        if let Some(store) = &self.store {
            store.save_cursor(&key, &report.cursor()).await?;
        }
        Ok(report)
    }

    async fn scan_chain(
        &self,
        backend: &dyn crate::backend::Backend,
        source: &dyn AddressSource,
        change: u32,
        report: &mut SyncReport,
    ) -> Result<Option<u32>, BackendError> {
        let mut last_used = None;
        let mut gap = 0u32;
        let mut index = 0u32;
        while gap < self.gap_limit {
            let address = source.address_at(change, index)?;
            let (entries, tx_count) = self.probe_address(backend, &address).await;
            report.addresses_scanned += 1;

            if entries.is_empty() && tx_count == 0 {
                gap += 1;
            } else {
                last_used = Some(index);
                gap = 0;
                for entry in entries {
                    report
                        .utxos
                        .push(to_address_utxo(entry, source, change, index)?);
                }
            }
            index += 1;
        }
        Ok(last_used)
    }

    /// One address probe. Provider failures degrade to "no activity" so a
    /// flaky address does not abort the whole scan.
    async fn probe_address(
        &self,
        backend: &dyn crate::backend::Backend,
        address: &str,
    ) -> (Vec<UtxoEntry>, u64) {
        let entries = match backend.address_utxos(address).await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(%address, error = %e, "utxo query failed, treating as empty");
                Vec::new()
            }
        };
        let tx_count = match backend.address_info(address).await {
            Ok(info) => info.tx_count,
            Err(e) => {
                tracing::warn!(%address, error = %e, "address query failed, treating as empty");
                0
            }
        };
        (entries, tx_count)
    }

    /// Re-scan on an interval until the stop signal flips. The caller joins
    /// the handle on shutdown.
    pub fn spawn_periodic(
        self: Arc<Self>,
        symbol: String,
        source: Arc<dyn AddressSource>,
        period: Duration,
        mut stop: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match self.sync(&symbol, source.as_ref()).await {
                            Ok(report) => {
                                tracing::debug!(symbol = %symbol,
                                    utxos = report.utxos.len(), "periodic sync done");
                            }
                            Err(BackendError::SyncInProgress(_)) => {}
                            Err(e) => {
                                tracing::warn!(symbol = %symbol, error = %e,
                                    "periodic sync failed");
                            }
                        }
                    }
                    changed = stop.changed() => {
                        if changed.is_err() || *stop.borrow() {
                            break;
                        }
                    }
                }
            }
        })
    }
}

fn to_address_utxo(
    entry: UtxoEntry,
    source: &dyn AddressSource,
    change: u32,
    index: u32,
) -> Result<AddressUtxo, BackendError> {
    let script_pubkey = match entry.script_bytes()? {
        Some(script) => script,
        None => source.script_at(change, index)?,
    };
    Ok(AddressUtxo {
        utxo: Utxo {
            txid: entry.txid,
            vout: entry.vout,
            amount_sat: entry.amount_sat,
            script_pubkey,
        },
        account: source.account(),
        change,
        index,
        script_type: source.script_type(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::MockBackend;
    use crate::types::AddressInfo;
    use tokio::sync::Semaphore;

    struct StaticSource;

    impl AddressSource for StaticSource {
        fn address_at(&self, change: u32, index: u32) -> Result<String, BackendError> {
            Ok(format!("mock:{change}:{index}"))
        }

        fn script_at(&self, change: u32, index: u32) -> Result<Vec<u8>, BackendError> {
            let mut script = vec![0x00, 0x14];
            script.extend_from_slice(&[change as u8; 10]);
            script.extend_from_slice(&[index as u8; 10]);
            Ok(script)
        }

        fn script_type(&self) -> ScriptType {
            ScriptType::P2wpkh
        }

        fn account(&self) -> u32 {
            0
        }
    }

    fn service_with(backend: Arc<MockBackend>, gap_limit: u32) -> Arc<SyncService> {
        let mut registry = BackendRegistry::new();
        registry.insert("BTC", backend).unwrap();
        Arc::new(SyncService::new(Arc::new(registry)).with_gap_limit(gap_limit))
    }

    fn mark_used(backend: &MockBackend, address: &str) {
        backend.active.lock().unwrap().insert(
            address.to_string(),
            AddressInfo {
                address: address.to_string(),
                tx_count: 1,
                ..Default::default()
            },
        );
    }

    #[tokio::test]
    async fn gap_limit_stops_the_scan() {
        let backend = Arc::new(MockBackend::default());
        mark_used(&backend, "mock:0:0");
        mark_used(&backend, "mock:0:3");
        backend.utxos.lock().unwrap().insert(
            "mock:0:3".into(),
            vec![UtxoEntry {
                txid: "aa".repeat(32),
                vout: 0,
                amount_sat: 70_000,
                address: "mock:0:3".into(),
                script_hex: None,
                confirmations: 3,
                block_height: Some(98),
            }],
        );

        let service = service_with(backend.clone(), 5);
        let report = service.sync("btc", &StaticSource).await.unwrap();

        assert_eq!(report.last_external, Some(3));
        assert_eq!(report.last_internal, None);
        assert_eq!(report.balance_sat(), 70_000);
        assert_eq!(report.utxos[0].index, 3);
        assert_eq!(report.utxos[0].change, 0);
        // Script fell back to the source since the provider sent none.
        assert_eq!(report.utxos[0].utxo.script_pubkey[0], 0x00);

        let queried = backend.queried.lock().unwrap().clone();
        // Used index 3 resets the gap, so the scan runs through 3 + 5.
        assert!(queried.contains(&"mock:0:8".to_string()));
        assert!(!queried.contains(&"mock:0:9".to_string()));
        // Internal chain is all unused, five probes only.
        assert!(queried.contains(&"mock:1:4".to_string()));
        assert!(!queried.contains(&"mock:1:5".to_string()));
    }

    #[tokio::test]
    async fn concurrent_sync_of_one_symbol_fails_fast() {
        let gate = Arc::new(Semaphore::new(0));
        let backend = Arc::new(MockBackend {
            gate: Some(gate.clone()),
            ..Default::default()
        });
        let service = service_with(backend, 2);

        let first = {
            let service = service.clone();
            tokio::spawn(async move { service.sync("BTC", &StaticSource).await })
        };
        // Let the first scan reach the gated backend.
        tokio::time::sleep(Duration::from_millis(20)).await;

        let second = service.sync("BTC", &StaticSource).await;
        assert!(matches!(second, Err(BackendError::SyncInProgress(_))));

        gate.add_permits(1_000);
        let report = first.await.unwrap().unwrap();
        assert_eq!(report.last_external, None);

        // The guard released the slot, a fresh scan is allowed.
        gate.add_permits(1_000);
        assert!(service.sync("BTC", &StaticSource).await.is_ok());
    }

    #[tokio::test]
    async fn periodic_sync_stops_on_signal() {
        let backend = Arc::new(MockBackend::default());
        let service = service_with(backend, 1);
        let (stop_tx, stop_rx) = watch::channel(false);

        let handle = service.spawn_periodic(
            "BTC".into(),
            Arc::new(StaticSource),
            Duration::from_millis(10),
            stop_rx,
        );
        tokio::time::sleep(Duration::from_millis(30)).await;
        stop_tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn cursor_reaches_the_store() {
        struct RecordingStore(Mutex<Option<(String, SyncCursor)>>);

        #[async_trait]
        impl SyncStore for RecordingStore {
            async fn save_cursor(
                &self,
                symbol: &str,
                cursor: &SyncCursor,
            ) -> Result<(), BackendError> {
                *self.0.lock().unwrap() = Some((symbol.to_string(), cursor.clone()));
                Ok(())
            }
        }

        let backend = Arc::new(MockBackend::default());
        mark_used(&backend, "mock:1:0");
        let store = Arc::new(RecordingStore(Mutex::new(None)));
        let mut registry = BackendRegistry::new();
        registry.insert("BTC", backend).unwrap();
        let service = SyncService::new(Arc::new(registry))
            .with_gap_limit(2)
            .with_store(store.clone());

        service.sync("btc", &StaticSource).await.unwrap();
        let (symbol, cursor) = store.0.lock().unwrap().clone().unwrap();
        assert_eq!(symbol, "BTC");
        assert_eq!(cursor.last_internal, Some(0));
        assert_eq!(cursor.block_height, 100);
    }
}
