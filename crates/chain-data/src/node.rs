//! Direct node JSON-RPC client.
//!
//! Two call conventions: `Utxo` for bitcoind-family nodes and `Evm` for
//! Ethereum-style nodes. Nodes index much less than an explorer does, so
//! several queries come back `Unsupported` here.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde_json::{json, Value};

use crate::backend::Backend;
use crate::config::{BackendConfig, NodeDialect};
use crate::error::BackendError;
use crate::fees::coin_per_kb_to_sat_per_vb;
use crate::http;
use crate::types::{
    AddressInfo, BlockHeaderInfo, FeeEstimates, HeaderLocator, TxInputSummary, TxOutputSummary,
    TxSummary, UtxoEntry,
};

const FEE_TARGETS: [u32; 5] = [1, 3, 6, 12, 25];

pub struct NodeRpcBackend {
    url: String,
    dialect: NodeDialect,
    username: Option<String>,
    password: Option<String>,
    client: Client,
    connected: AtomicBool,
}

fn parse_hex_quantity(value: &Value, context: &str) -> Result<u128, BackendError> {
    let text = value
        .as_str()
        .ok_or_else(|| BackendError::Decode(format!("{context}: expected hex string")))?;
    let digits = text
        .strip_prefix("0x")
        .ok_or_else(|| BackendError::Decode(format!("{context}: missing 0x prefix")))?;
    u128::from_str_radix(digits, 16)
        .map_err(|e| BackendError::Decode(format!("{context}: {e}")))
}

fn coin_float_to_sat(value: f64) -> u64 {
    if !value.is_finite() || value <= 0.0 {
        0
    } else {
        (value * 1e8).round() as u64
    }
}

impl NodeRpcBackend {
    pub fn new(config: &BackendConfig) -> Result<Self, BackendError> {
        let url = config
            .url
            .as_deref()
            .ok_or_else(|| BackendError::Config("node rpc backend requires a url".into()))?
            .to_string();
        Ok(Self {
            url,
            dialect: config.dialect,
            username: config.username.clone(),
            password: config.password.clone(),
            client: http::build_client(config.timeout())?,
            connected: AtomicBool::new(false),
        })
    }

    fn request(&self) -> RequestBuilder {
        let mut builder = self.client.post(&self.url);
        if let Some(username) = &self.username {
            builder = builder.basic_auth(username, self.password.as_deref());
        }
        builder
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, BackendError> {
        http::json_rpc(self.request(), method, params).await
    }

    fn ensure_connected(&self) -> Result<(), BackendError> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(BackendError::NotConnected)
        }
    }

    async fn scan_address(&self, address: &str) -> Result<Value, BackendError> {
        let descriptor = format!("addr({address})");
        self.call("scantxoutset", json!(["start", [descriptor]]))
            .await
    }

    async fn utxo_tip(&self) -> Result<u64, BackendError> {
        let result = self.call("getblockcount", json!([])).await?;
        result
            .as_u64()
            .ok_or_else(|| BackendError::Decode("getblockcount: expected number".into()))
    }

    async fn evm_tip(&self) -> Result<u64, BackendError> {
        let result = self.call("eth_blockNumber", json!([])).await?;
        Ok(parse_hex_quantity(&result, "eth_blockNumber")? as u64)
    }
}

fn utxo_tx_summary(tx: &Value, txid: &str) -> TxSummary {
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
    TxSummary {
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
    }
}

#[async_trait]
impl Backend for NodeRpcBackend {
    async fn connect(&self) -> Result<(), BackendError> {
        let height = match self.dialect {
            NodeDialect::Utxo => self.utxo_tip().await?,
            NodeDialect::Evm => self.evm_tip().await?,
        };
        tracing::info!(url = %self.url, height, dialect = ?self.dialect, "node rpc connected");
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
        self.ensure_connected()?;
        match self.dialect {
            NodeDialect::Utxo => {
                let scan = self.scan_address(address).await?;
                let total = scan
                    .get("total_amount")
                    .and_then(Value::as_f64)
                    .unwrap_or(0.0);
                let tx_count = scan
                    .get("unspents")
                    .and_then(Value::as_array)
                    .map(|u| u.len() as u64)
                    .unwrap_or(0);
                Ok(AddressInfo {
                    address: address.to_string(),
                    confirmed: i128::from(coin_float_to_sat(total)),
                    // The utxo set scan cannot see the mempool.
                    unconfirmed: 0,
                    tx_count,
                })
            }
            NodeDialect::Evm => {
                let balance = self.call("eth_getBalance", json!([address, "latest"])).await?;
                let nonce = self
                    .call("eth_getTransactionCount", json!([address, "latest"]))
                    .await?;
                Ok(AddressInfo {
                    address: address.to_string(),
                    confirmed: parse_hex_quantity(&balance, "eth_getBalance")? as i128,
                    unconfirmed: 0,
                    tx_count: parse_hex_quantity(&nonce, "eth_getTransactionCount")? as u64,
                })
            }
        }
    }

    async fn address_utxos(&self, address: &str) -> Result<Vec<UtxoEntry>, BackendError> {
        self.ensure_connected()?;
        if self.dialect == NodeDialect::Evm {
            return Err(BackendError::Unsupported(
                "account-model chains have no utxos".into(),
            ));
        }
        let scan = self.scan_address(address).await?;
        let tip = match scan.get("height").and_then(Value::as_u64) {
            Some(height) => height,
            None => self.utxo_tip().await?,
        };
        let unspents = scan
            .get("unspents")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let mut entries = Vec::with_capacity(unspents.len());
        for u in unspents {
            let txid = u
                .get("txid")
                .and_then(Value::as_str)
                .ok_or_else(|| BackendError::Decode("scantxoutset: missing txid".into()))?
                .to_string();
            let height = u.get("height").and_then(Value::as_u64);
            entries.push(UtxoEntry {
                txid,
                vout: u.get("vout").and_then(Value::as_u64).unwrap_or(0) as u32,
                amount_sat: coin_float_to_sat(
                    u.get("amount").and_then(Value::as_f64).unwrap_or(0.0),
                ),
                address: address.to_string(),
                script_hex: u
                    .get("scriptPubKey")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                confirmations: height.map(|h| tip.saturating_sub(h) + 1).unwrap_or(0),
                block_height: height,
            });
        }
        Ok(entries)
    }

    async fn address_txs(
        &self,
        _address: &str,
        _cursor: Option<&str>,
    ) -> Result<Vec<TxSummary>, BackendError> {
        self.ensure_connected()?;
        Err(BackendError::Unsupported(
            "nodes do not index address history, use an indexer backend".into(),
        ))
    }

    async fn transaction(&self, txid: &str) -> Result<TxSummary, BackendError> {
        self.ensure_connected()?;
        if self.dialect == NodeDialect::Evm {
            return Err(BackendError::Unsupported(
                "utxo transaction queries on an evm node".into(),
            ));
        }
        let tx = self.call("getrawtransaction", json!([txid, true])).await?;
        Ok(utxo_tx_summary(&tx, txid))
    }

    async fn raw_transaction(&self, txid: &str) -> Result<Vec<u8>, BackendError> {
        self.ensure_connected()?;
        if self.dialect == NodeDialect::Evm {
            return Err(BackendError::Unsupported(
                "utxo transaction queries on an evm node".into(),
            ));
        }
        let result = self.call("getrawtransaction", json!([txid, false])).await?;
        let raw_hex = result
            .as_str()
            .ok_or_else(|| BackendError::Decode("getrawtransaction: expected hex".into()))?;
        hex::decode(raw_hex).map_err(|e| BackendError::Decode(format!("raw tx hex: {e}")))
    }

    async fn broadcast(&self, raw_hex: &str) -> Result<String, BackendError> {
        self.ensure_connected()?;
        let (method, params) = match self.dialect {
            NodeDialect::Utxo => ("sendrawtransaction", json!([raw_hex])),
            NodeDialect::Evm => ("eth_sendRawTransaction", json!([format!("0x{raw_hex}")])),
        };
        match self.call(method, params).await {
            Ok(value) => {
                let txid = value
                    .as_str()
                    .map(str::to_string)
                    .ok_or_else(|| BackendError::Decode(format!("{method}: expected txid")))?;
                tracing::info!(%txid, "transaction broadcast");
                Ok(txid)
            }
            Err(BackendError::Rpc { message, .. }) => Err(BackendError::Broadcast(message)),
            Err(e) => Err(e),
        }
    }

    async fn block_height(&self) -> Result<u64, BackendError> {
        self.ensure_connected()?;
        match self.dialect {
            NodeDialect::Utxo => self.utxo_tip().await,
            NodeDialect::Evm => self.evm_tip().await,
        }
    }

    async fn block_header(&self, locator: HeaderLocator) -> Result<BlockHeaderInfo, BackendError> {
        self.ensure_connected()?;
        if self.dialect == NodeDialect::Evm {
            return Err(BackendError::Unsupported(
                "raw headers on an evm node".into(),
            ));
        }
        let (hash, height) = match locator {
            HeaderLocator::Height(height) => {
                let result = self.call("getblockhash", json!([height])).await?;
                let hash = result
                    .as_str()
                    .ok_or_else(|| BackendError::Decode("getblockhash: expected hash".into()))?
                    .to_string();
                (hash, Some(height))
            }
            HeaderLocator::Hash(hash) => (hash, None),
        };
        // verbose=false returns the 80 serialized bytes as hex.
        let result = self.call("getblockheader", json!([hash, false])).await?;
        let header_hex = result
            .as_str()
            .ok_or_else(|| BackendError::Decode("getblockheader: expected hex".into()))?;
        let raw = hex::decode(header_hex)
            .map_err(|e| BackendError::Decode(format!("header hex: {e}")))?;
        BlockHeaderInfo::from_raw(&raw, height)
    }

    async fn fee_estimates(&self) -> Result<FeeEstimates, BackendError> {
        self.ensure_connected()?;
        match self.dialect {
            NodeDialect::Utxo => {
                let mut rates = [0u64; 5];
                for (slot, target) in rates.iter_mut().zip(FEE_TARGETS) {
                    match self.call("estimatesmartfee", json!([target])).await {
                        Ok(result) => {
                            let coin_per_kb = result
                                .get("feerate")
                                .and_then(Value::as_f64)
                                .unwrap_or(0.0);
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
            NodeDialect::Evm => {
                // A single gas price serves every urgency tier.
                let result = self.call("eth_gasPrice", json!([])).await?;
                let gas_price = parse_hex_quantity(&result, "eth_gasPrice")? as u64;
                Ok(FeeEstimates {
                    fastest: gas_price,
                    half_hour: gas_price,
                    hour: gas_price,
                    economy: gas_price,
                    minimum: gas_price,
                })
            }
        }
    }
}
