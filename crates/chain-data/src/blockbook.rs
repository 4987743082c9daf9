//! Blockbook indexer client (Trezor-style REST API).
//!
//! Blockbook reports amounts as decimal strings of smallest units and fee
//! rates as coin/kB, both normalized here.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::backend::Backend;
use crate::config::BackendConfig;
use crate::error::BackendError;
use crate::fees::coin_per_kb_to_sat_per_vb;
use crate::http;
use crate::types::{
    AddressInfo, BlockHeaderInfo, FeeEstimates, HeaderLocator, TxInputSummary, TxOutputSummary,
    TxSummary, UtxoEntry,
};

const FEE_TARGETS: [u32; 5] = [1, 3, 6, 12, 25];

pub struct BlockbookBackend {
    base_url: String,
    client: Client,
    connected: AtomicBool,
}

fn parse_sat_i128(value: &str, context: &str) -> Result<i128, BackendError> {
    value
        .parse()
        .map_err(|e| BackendError::Decode(format!("{context}: {e}")))
}

fn parse_sat_u64(value: &str, context: &str) -> Result<u64, BackendError> {
    value
        .parse()
        .map_err(|e| BackendError::Decode(format!("{context}: {e}")))
}

#[derive(Debug, Deserialize)]
struct BlockbookAddress {
    balance: String,
    #[serde(rename = "unconfirmedBalance")]
    unconfirmed_balance: String,
    txs: u64,
    #[serde(rename = "unconfirmedTxs", default)]
    unconfirmed_txs: u64,
    #[serde(default)]
    transactions: Vec<BlockbookTx>,
}

#[derive(Debug, Deserialize)]
struct BlockbookUtxo {
    txid: String,
    vout: u32,
    value: String,
    #[serde(default)]
    height: Option<u64>,
    #[serde(default)]
    confirmations: u64,
}

#[derive(Debug, Deserialize)]
struct BlockbookVin {
    #[serde(default)]
    txid: String,
    #[serde(default)]
    vout: u32,
    #[serde(default)]
    value: Option<String>,
    #[serde(default)]
    addresses: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct BlockbookVout {
    value: String,
    #[serde(default)]
    hex: String,
    #[serde(default)]
    addresses: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct BlockbookTx {
    txid: String,
    #[serde(default)]
    version: i32,
    #[serde(default)]
    size: u64,
    #[serde(default)]
    vsize: u64,
    #[serde(rename = "lockTime", default)]
    lock_time: u32,
    #[serde(default)]
    fees: Option<String>,
    #[serde(default)]
    confirmations: u64,
    #[serde(rename = "blockHeight", default)]
    block_height: Option<i64>,
    #[serde(rename = "blockHash", default)]
    block_hash: Option<String>,
    #[serde(default)]
    hex: Option<String>,
    vin: Vec<BlockbookVin>,
    vout: Vec<BlockbookVout>,
}

#[derive(Debug, Deserialize)]
struct BlockbookStatus {
    blockbook: BlockbookStatusInner,
}

#[derive(Debug, Deserialize)]
struct BlockbookStatusInner {
    #[serde(rename = "bestHeight")]
    best_height: u64,
}

#[derive(Debug, Deserialize)]
struct BlockbookBlock {
    hash: String,
    height: u64,
    version: i32,
    #[serde(rename = "previousBlockHash", default)]
    previous_block_hash: String,
    #[serde(rename = "merkleRoot", default)]
    merkle_root: String,
    time: u32,
    bits: String,
    nonce: String,
    difficulty: String,
}

#[derive(Debug, Deserialize)]
struct EstimateFeeResult {
    result: String,
}

fn tx_summary(tx: BlockbookTx) -> Result<TxSummary, BackendError> {
    let fee_sat = match tx.fees {
        Some(f) => Some(parse_sat_u64(&f, "tx fee")?),
        None => None,
    };
    let block_height = tx.block_height.filter(|h| *h >= 0).map(|h| h as u64);
    let mut inputs = Vec::with_capacity(tx.vin.len());
    for vin in tx.vin {
        let prevout = match vin.value {
            Some(value) => Some(TxOutputSummary {
                value_sat: parse_sat_u64(&value, "vin value")?,
                script_hex: String::new(),
                address: vin.addresses.first().cloned(),
            }),
            None => None,
        };
        inputs.push(TxInputSummary {
            txid: vin.txid,
            vout: vin.vout,
            prevout,
        });
    }
    let mut outputs = Vec::with_capacity(tx.vout.len());
    for vout in tx.vout {
        outputs.push(TxOutputSummary {
            value_sat: parse_sat_u64(&vout.value, "vout value")?,
            script_hex: vout.hex,
            address: vout.addresses.first().cloned(),
        });
    }
    Ok(TxSummary {
        txid: tx.txid,
        version: tx.version,
        size: tx.size,
        vsize: if tx.vsize > 0 { tx.vsize } else { tx.size },
        weight: tx.vsize * 4,
        lock_time: tx.lock_time,
        fee_sat,
        confirmed: tx.confirmations > 0,
        block_height,
        block_hash: tx.block_hash,
        inputs,
        outputs,
    })
}

impl BlockbookBackend {
    pub fn new(config: &BackendConfig) -> Result<Self, BackendError> {
        let base_url = config
            .url
            .as_deref()
            .ok_or_else(|| BackendError::Config("blockbook backend requires a url".into()))?
            .trim_end_matches('/')
            .to_string();
        Ok(Self {
            base_url,
            client: http::build_client(config.timeout())?,
            connected: AtomicBool::new(false),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn ensure_connected(&self) -> Result<(), BackendError> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(BackendError::NotConnected)
        }
    }

    async fn status(&self) -> Result<BlockbookStatus, BackendError> {
        http::get_json(&self.client, &self.url("/api/v2/")).await
    }
}

#[async_trait]
impl Backend for BlockbookBackend {
    async fn connect(&self) -> Result<(), BackendError> {
        let status = self.status().await?;
        tracing::info!(
            url = %self.base_url,
            height = status.blockbook.best_height,
            "blockbook backend connected"
        );
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
        let info: BlockbookAddress = http::get_json(
            &self.client,
            &self.url(&format!("/api/v2/address/{address}?details=basic")),
        )
        .await?;
        Ok(AddressInfo {
            address: address.to_string(),
            confirmed: parse_sat_i128(&info.balance, "balance")?,
            unconfirmed: parse_sat_i128(&info.unconfirmed_balance, "unconfirmed balance")?,
            tx_count: info.txs + info.unconfirmed_txs,
        })
    }

    async fn address_utxos(&self, address: &str) -> Result<Vec<UtxoEntry>, BackendError> {
        self.ensure_connected()?;
        let utxos: Vec<BlockbookUtxo> = http::get_json(
            &self.client,
            &self.url(&format!("/api/v2/utxo/{address}")),
        )
        .await?;
        let mut entries = Vec::with_capacity(utxos.len());
        for u in utxos {
            entries.push(UtxoEntry {
                amount_sat: parse_sat_u64(&u.value, "utxo value")?,
                txid: u.txid,
                vout: u.vout,
                address: address.to_string(),
                script_hex: None,
                confirmations: u.confirmations,
                block_height: u.height,
            });
        }
        Ok(entries)
    }

    async fn address_txs(
        &self,
        address: &str,
        cursor: Option<&str>,
    ) -> Result<Vec<TxSummary>, BackendError> {
        self.ensure_connected()?;
        // Blockbook paginates with 1-based page numbers.
        let page = cursor.unwrap_or("1");
        let info: BlockbookAddress = http::get_json(
            &self.client,
            &self.url(&format!("/api/v2/address/{address}?details=txs&page={page}")),
        )
        .await?;
        info.transactions.into_iter().map(tx_summary).collect()
    }

    async fn transaction(&self, txid: &str) -> Result<TxSummary, BackendError> {
        self.ensure_connected()?;
        let tx: BlockbookTx =
            http::get_json(&self.client, &self.url(&format!("/api/v2/tx/{txid}"))).await?;
        tx_summary(tx)
    }

    async fn raw_transaction(&self, txid: &str) -> Result<Vec<u8>, BackendError> {
        self.ensure_connected()?;
        let tx: BlockbookTx =
            http::get_json(&self.client, &self.url(&format!("/api/v2/tx/{txid}"))).await?;
        let raw_hex = tx
            .hex
            .ok_or_else(|| BackendError::NotFound(format!("raw hex for {txid}")))?;
        hex::decode(&raw_hex).map_err(|e| BackendError::Decode(format!("raw tx hex: {e}")))
    }

    async fn broadcast(&self, raw_hex: &str) -> Result<String, BackendError> {
        self.ensure_connected()?;
        // Blockbook accepts the raw hex in the path.
        let result: serde_json::Value = http::get_json(
            &self.client,
            &self.url(&format!("/api/v2/sendtx/{raw_hex}")),
        )
        .await?;
        if let Some(error) = result.get("error") {
            let message = error
                .get("message")
                .and_then(serde_json::Value::as_str)
                .unwrap_or("broadcast rejected")
                .to_string();
            return Err(BackendError::Broadcast(message));
        }
        let txid = result
            .get("result")
            .and_then(serde_json::Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| BackendError::Decode("sendtx: missing result".into()))?;
        tracing::info!(%txid, "transaction broadcast");
        Ok(txid)
    }

    async fn block_height(&self) -> Result<u64, BackendError> {
        self.ensure_connected()?;
        Ok(self.status().await?.blockbook.best_height)
    }

    async fn block_header(&self, locator: HeaderLocator) -> Result<BlockHeaderInfo, BackendError> {
        self.ensure_connected()?;
        let path = match &locator {
            HeaderLocator::Height(height) => format!("/api/v2/block/{height}"),
            HeaderLocator::Hash(hash) => format!("/api/v2/block/{hash}"),
        };
        let block: BlockbookBlock = http::get_json(&self.client, &self.url(&path)).await?;
        let bits = u32::from_str_radix(block.bits.trim_start_matches("0x"), 16)
            .map_err(|e| BackendError::Decode(format!("block bits: {e}")))?;
        let nonce = block
            .nonce
            .parse()
            .map_err(|e| BackendError::Decode(format!("block nonce: {e}")))?;
        let difficulty = block
            .difficulty
            .parse()
            .map_err(|e| BackendError::Decode(format!("block difficulty: {e}")))?;
        Ok(BlockHeaderInfo {
            hash: block.hash,
            height: Some(block.height),
            version: block.version,
            prev_hash: block.previous_block_hash,
            merkle_root: block.merkle_root,
            time: block.time,
            bits,
            nonce,
            difficulty,
        })
    }

    async fn fee_estimates(&self) -> Result<FeeEstimates, BackendError> {
        self.ensure_connected()?;
        let mut rates = [0u64; 5];
        for (slot, target) in rates.iter_mut().zip(FEE_TARGETS) {
            let result: Result<EstimateFeeResult, BackendError> = http::get_json(
                &self.client,
                &self.url(&format!("/api/v2/estimatefee/{target}")),
            )
            .await;
            match result {
                Ok(estimate) => {
                    let coin_per_kb: f64 = estimate.result.parse().unwrap_or(0.0);
                    *slot = coin_per_kb_to_sat_per_vb(coin_per_kb);
                }
                Err(e) => {
                    // A failed target leaves its bucket at zero.
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
