//! Electrum protocol client over plain TCP or TLS.
//!
//! Speaks newline-delimited JSON-RPC. Addresses are converted to script
//! hashes locally, so the client needs the chain parameters of the coin it
//! serves.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;

use chain_params::ChainParams;

use crate::backend::Backend;
use crate::config::{BackendConfig, ElectrumServer};
use crate::error::BackendError;
use crate::fees::coin_per_kb_to_sat_per_vb;
use crate::types::{
    AddressInfo, BlockHeaderInfo, FeeEstimates, HeaderLocator, TxInputSummary, TxOutputSummary,
    TxSummary, UtxoEntry,
};

const CLIENT_NAME: &str = "wallet-engine";
const PROTOCOL_VERSION: &str = "1.4";
const FEE_TARGETS: [u32; 5] = [1, 3, 6, 12, 25];

trait Stream: AsyncRead + AsyncWrite + Send + Unpin {}
impl<T: AsyncRead + AsyncWrite + Send + Unpin> Stream for T {}

struct Session {
    reader: BufReader<tokio::io::ReadHalf<Box<dyn Stream>>>,
    writer: tokio::io::WriteHalf<Box<dyn Stream>>,
    server: String,
}

impl Session {
    fn new(stream: Box<dyn Stream>, server: String) -> Self {
        let (read_half, write_half) = tokio::io::split(stream);
        Self {
            reader: BufReader::new(read_half),
            writer: write_half,
            server,
        }
    }

    /// One request/response exchange. Frames whose id does not match are
    /// subscription notifications and are skipped.
    async fn exchange(
        &mut self,
        id: u64,
        method: &str,
        params: Value,
    ) -> Result<Value, BackendError> {
        let request = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        let mut line = serde_json::to_string(&request)?;
        line.push('\n');
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.flush().await?;

        loop {
            let mut buf = String::new();
            let n = self.reader.read_line(&mut buf).await?;
            if n == 0 {
                return Err(BackendError::Io(format!(
                    "{}: connection closed",
                    self.server
                )));
            }
            let frame: Value = match serde_json::from_str(buf.trim()) {
                Ok(v) => v,
                Err(_) => continue,
            };
            if frame.get("id").and_then(Value::as_u64) != Some(id) {
                continue;
            }
            if let Some(error) = frame.get("error").filter(|e| !e.is_null()) {
                let code = error.get("code").and_then(Value::as_i64).unwrap_or(0);
                let message = error
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown electrum error")
                    .to_string();
                return Err(BackendError::Rpc { code, message });
            }
            return frame
                .get("result")
                .cloned()
                .ok_or_else(|| BackendError::Decode(format!("{method}: missing result")));
        }
    }
}

pub struct ElectrumBackend {
    servers: Vec<ElectrumServer>,
    params: Arc<ChainParams>,
    timeout: std::time::Duration,
    session: Mutex<Option<Session>>,
    next_id: AtomicU64,
    connected: AtomicBool,
}

/// Electrum script hash: sha256 of the scriptPubKey, byte-reversed, hex.
pub fn script_hash_hex(script: &[u8]) -> String {
    let mut digest: [u8; 32] = Sha256::digest(script).into();
    digest.reverse();
    hex::encode(digest)
}

fn coin_float_to_sat(value: f64) -> u64 {
    if !value.is_finite() || value <= 0.0 {
        0
    } else {
        (value * 1e8).round() as u64
    }
}

impl ElectrumBackend {
    pub fn new(config: &BackendConfig, params: Arc<ChainParams>) -> Result<Self, BackendError> {
        if config.servers.is_empty() {
            return Err(BackendError::Config(
                "electrum backend requires at least one server".into(),
            ));
        }
        Ok(Self {
            servers: config.servers.clone(),
            params,
            timeout: config.timeout(),
            session: Mutex::new(None),
            next_id: AtomicU64::new(0),
            connected: AtomicBool::new(false),
        })
    }

    async fn open_stream(&self, server: &ElectrumServer) -> Result<Box<dyn Stream>, BackendError> {
        let addr = format!("{}:{}", server.host, server.port);
        let tcp = tokio::time::timeout(self.timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| BackendError::Io(format!("{addr}: connect timed out")))??;
        if !server.tls {
            return Ok(Box::new(tcp));
        }
        let mut roots = RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let tls_config = ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth();
        let connector = TlsConnector::from(Arc::new(tls_config));
        let name = ServerName::try_from(server.host.clone())
            .map_err(|e| BackendError::Config(format!("{}: {e}", server.host)))?;
        let stream = tokio::time::timeout(self.timeout, connector.connect(name, tcp))
            .await
            .map_err(|_| BackendError::Io(format!("{addr}: tls handshake timed out")))??;
        Ok(Box::new(stream))
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, BackendError> {
        let mut guard = self.session.lock().await;
        let session = guard.as_mut().ok_or(BackendError::NotConnected)?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let result = tokio::time::timeout(self.timeout, session.exchange(id, method, params))
            .await
            .map_err(|_| BackendError::Io(format!("{method}: request timed out")));
        let result = match result {
            Ok(inner) => inner,
            Err(e) => Err(e),
        };
        if matches!(result, Err(BackendError::Io(_))) {
            // The stream is in an unknown state after an io failure.
            *guard = None;
            self.connected.store(false, Ordering::SeqCst);
        }
        result
    }

    fn script_hash_for(&self, address: &str) -> Result<String, BackendError> {
        let script = chain_btc::script_for_address(address, &self.params)?;
        Ok(script_hash_hex(&script))
    }

    async fn tip_height(&self) -> Result<u64, BackendError> {
        let result = self.call("blockchain.headers.subscribe", json!([])).await?;
        result
            .get("height")
            .and_then(Value::as_u64)
            .ok_or_else(|| BackendError::Decode("headers.subscribe: missing height".into()))
    }
}

#[async_trait]
impl Backend for ElectrumBackend {
    async fn connect(&self) -> Result<(), BackendError> {
        let mut guard = self.session.lock().await;
        let mut last_error = None;
        for server in &self.servers {
            let addr = format!("{}:{}", server.host, server.port);
            let stream = match self.open_stream(server).await {
                Ok(s) => s,
                Err(e) => {
                    tracing::warn!(server = %addr, error = %e, "electrum connect failed");
                    last_error = Some(e);
                    continue;
                }
            };
            let mut session = Session::new(stream, addr.clone());
            let id = self.next_id.fetch_add(1, Ordering::SeqCst);
            let handshake = tokio::time::timeout(
                self.timeout,
                session.exchange(id, "server.version", json!([CLIENT_NAME, PROTOCOL_VERSION])),
            )
            .await
            .map_err(|_| BackendError::Io(format!("{addr}: handshake timed out")));
            match handshake {
                Ok(Ok(version)) => {
                    tracing::info!(server = %addr, %version, "electrum backend connected");
                    *guard = Some(session);
                    self.connected.store(true, Ordering::SeqCst);
                    return Ok(());
                }
                Ok(Err(e)) | Err(e) => {
                    tracing::warn!(server = %addr, error = %e, "electrum handshake failed");
                    last_error = Some(e);
                }
            }
        }
        Err(last_error
            .unwrap_or_else(|| BackendError::Io("no electrum server reachable".into())))
    }

    async fn close(&self) -> Result<(), BackendError> {
        let mut guard = self.session.lock().await;
        if let Some(mut session) = guard.take() {
            let _ = session.writer.shutdown().await;
        }
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn address_info(&self, address: &str) -> Result<AddressInfo, BackendError> {
        let script_hash = self.script_hash_for(address)?;
        let balance = self
            .call("blockchain.scripthash.get_balance", json!([script_hash]))
            .await?;
        let history = self
            .call("blockchain.scripthash.get_history", json!([script_hash]))
            .await?;
        let confirmed = balance
            .get("confirmed")
            .and_then(Value::as_i64)
            .ok_or_else(|| BackendError::Decode("get_balance: missing confirmed".into()))?;
        let unconfirmed = balance
            .get("unconfirmed")
            .and_then(Value::as_i64)
            .unwrap_or(0);
        let tx_count = history
            .as_array()
            .map(|a| a.len() as u64)
            .ok_or_else(|| BackendError::Decode("get_history: expected array".into()))?;
        Ok(AddressInfo {
            address: address.to_string(),
            confirmed: i128::from(confirmed),
            unconfirmed: i128::from(unconfirmed),
            tx_count,
        })
    }

    async fn address_utxos(&self, address: &str) -> Result<Vec<UtxoEntry>, BackendError> {
        let script_hash = self.script_hash_for(address)?;
        let result = self
            .call("blockchain.scripthash.listunspent", json!([script_hash]))
            .await?;
        let items = result
            .as_array()
            .ok_or_else(|| BackendError::Decode("listunspent: expected array".into()))?;
        let tip = if items
            .iter()
            .any(|i| i.get("height").and_then(Value::as_u64).unwrap_or(0) > 0)
        {
            self.tip_height().await?
        } else {
            0
        };
        let mut entries = Vec::with_capacity(items.len());
        for item in items {
            let txid = item
                .get("tx_hash")
                .and_then(Value::as_str)
                .ok_or_else(|| BackendError::Decode("listunspent: missing tx_hash".into()))?
                .to_string();
            let vout = item.get("tx_pos").and_then(Value::as_u64).unwrap_or(0) as u32;
            let amount_sat = item
                .get("value")
                .and_then(Value::as_u64)
                .ok_or_else(|| BackendError::Decode("listunspent: missing value".into()))?;
            let height = item.get("height").and_then(Value::as_u64).unwrap_or(0);
            let (confirmations, block_height) = if height > 0 {
                (tip.saturating_sub(height) + 1, Some(height))
            } else {
                (0, None)
            };
            entries.push(UtxoEntry {
                txid,
                vout,
                amount_sat,
                address: address.to_string(),
                script_hex: None,
                confirmations,
                block_height,
            });
        }
        Ok(entries)
    }

    async fn address_txs(
        &self,
        address: &str,
        _cursor: Option<&str>,
    ) -> Result<Vec<TxSummary>, BackendError> {
        // Electrum history is returned whole; pagination does not apply.
        let script_hash = self.script_hash_for(address)?;
        let result = self
            .call("blockchain.scripthash.get_history", json!([script_hash]))
            .await?;
        let items = result
            .as_array()
            .ok_or_else(|| BackendError::Decode("get_history: expected array".into()))?;
        let mut txs = Vec::with_capacity(items.len());
        for item in items {
            let txid = item
                .get("tx_hash")
                .and_then(Value::as_str)
                .ok_or_else(|| BackendError::Decode("get_history: missing tx_hash".into()))?
                .to_string();
            let height = item.get("height").and_then(Value::as_i64).unwrap_or(0);
            txs.push(TxSummary {
                txid,
                confirmed: height > 0,
                block_height: if height > 0 { Some(height as u64) } else { None },
                ..Default::default()
            });
        }
        Ok(txs)
    }

    async fn transaction(&self, txid: &str) -> Result<TxSummary, BackendError> {
        let tx = self
            .call("blockchain.transaction.get", json!([txid, true]))
            .await?;
        let outputs = tx
            .get("vout")
            .and_then(Value::as_array)
            .map(|outs| {
                outs.iter()
                    .map(|o| {
                        let script = o.get("scriptPubKey");
                        TxOutputSummary {
                            value_sat: coin_float_to_sat(
                                o.get("value").and_then(Value::as_f64).unwrap_or(0.0),
                            ),
                            script_hex: script
                                .and_then(|s| s.get("hex"))
                                .and_then(Value::as_str)
                                .unwrap_or_default()
                                .to_string(),
                            address: script
                                .and_then(|s| s.get("address"))
                                .and_then(Value::as_str)
                                .map(str::to_string),
                        }
                    })
                    .collect()
            })
            .unwrap_or_default();
        let inputs = tx
            .get("vin")
            .and_then(Value::as_array)
            .map(|ins| {
                ins.iter()
                    .map(|i| TxInputSummary {
                        txid: i
                            .get("txid")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string(),
                        vout: i.get("vout").and_then(Value::as_u64).unwrap_or(0) as u32,
                        prevout: None,
                    })
                    .collect()
            })
            .unwrap_or_default();
        let confirmations = tx
            .get("confirmations")
            .and_then(Value::as_u64)
            .unwrap_or(0);
        Ok(TxSummary {
            txid: tx
                .get("txid")
                .and_then(Value::as_str)
                .unwrap_or(txid)
                .to_string(),
            version: tx.get("version").and_then(Value::as_i64).unwrap_or(0) as i32,
            size: tx.get("size").and_then(Value::as_u64).unwrap_or(0),
            vsize: tx.get("vsize").and_then(Value::as_u64).unwrap_or(0),
            weight: tx.get("weight").and_then(Value::as_u64).unwrap_or(0),
            lock_time: tx.get("locktime").and_then(Value::as_u64).unwrap_or(0) as u32,
            fee_sat: None,
            confirmed: confirmations > 0,
            block_height: None,
            block_hash: tx
                .get("blockhash")
                .and_then(Value::as_str)
                .map(str::to_string),
            inputs,
            outputs,
        })
    }

    async fn raw_transaction(&self, txid: &str) -> Result<Vec<u8>, BackendError> {
        let result = self
            .call("blockchain.transaction.get", json!([txid, false]))
            .await?;
        let raw_hex = result
            .as_str()
            .ok_or_else(|| BackendError::Decode("transaction.get: expected hex string".into()))?;
        hex::decode(raw_hex).map_err(|e| BackendError::Decode(format!("raw tx hex: {e}")))
    }

    async fn broadcast(&self, raw_hex: &str) -> Result<String, BackendError> {
        let result = self
            .call("blockchain.transaction.broadcast", json!([raw_hex]))
            .await;
        match result {
            Ok(value) => {
                let txid = value
                    .as_str()
                    .map(str::to_string)
                    .ok_or_else(|| BackendError::Decode("broadcast: expected txid".into()))?;
                tracing::info!(%txid, "transaction broadcast");
                Ok(txid)
            }
            Err(BackendError::Rpc { message, .. }) => Err(BackendError::Broadcast(message)),
            Err(e) => Err(e),
        }
    }

    async fn block_height(&self) -> Result<u64, BackendError> {
        self.tip_height().await
    }

    async fn block_header(&self, locator: HeaderLocator) -> Result<BlockHeaderInfo, BackendError> {
        let height = match locator {
            HeaderLocator::Height(height) => height,
            HeaderLocator::Hash(_) => {
                return Err(BackendError::Unsupported(
                    "electrum headers are fetched by height".into(),
                ))
            }
        };
        let result = self.call("blockchain.block.header", json!([height])).await?;
        let header_hex = result
            .as_str()
            .ok_or_else(|| BackendError::Decode("block.header: expected hex string".into()))?;
        let raw = hex::decode(header_hex)
            .map_err(|e| BackendError::Decode(format!("header hex: {e}")))?;
        BlockHeaderInfo::from_raw(&raw, Some(height))
    }

    async fn fee_estimates(&self) -> Result<FeeEstimates, BackendError> {
        let mut rates = [0u64; 5];
        for (slot, target) in rates.iter_mut().zip(FEE_TARGETS) {
            match self.call("blockchain.estimatefee", json!([target])).await {
                Ok(value) => {
                    // The server returns -1 when it has no estimate.
                    let coin_per_kb = value.as_f64().unwrap_or(-1.0);
                    *slot = coin_per_kb_to_sat_per_vb(coin_per_kb);
                }
                Err(e) => {
                    tracing::warn!(target, error = %e, "fee estimate failed");
                }
            }
        }
        Ok(FeeEstimates {
            fastest: rates[0],
            half_hour: rates[1],
            hour: rates[2],
            economy: rates[3],
            minimum: rates[4],
        })
    }
}
