//! Esplora-style REST explorer client (blockstream.info, mempool.space).

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::backend::Backend;
use crate::config::BackendConfig;
use crate::error::BackendError;
use crate::http;
use crate::types::{
    AddressInfo, BlockHeaderInfo, FeeEstimates, HeaderLocator, TxInputSummary, TxOutputSummary,
    TxSummary, UtxoEntry,
};

pub struct EsploraBackend {
    base_url: String,
    client: Client,
    connected: AtomicBool,
}

#[derive(Debug, Deserialize)]
struct EsploraStats {
    funded_txo_sum: u64,
    spent_txo_sum: u64,
    tx_count: u64,
}

#[derive(Debug, Deserialize)]
struct EsploraAddress {
    chain_stats: EsploraStats,
    mempool_stats: EsploraStats,
}

#[derive(Debug, Deserialize)]
struct EsploraTxStatus {
    confirmed: bool,
    block_height: Option<u64>,
    block_hash: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EsploraUtxo {
    txid: String,
    vout: u32,
    value: u64,
    status: EsploraTxStatus,
}

#[derive(Debug, Deserialize)]
struct EsploraVout {
    value: u64,
    scriptpubkey: String,
    scriptpubkey_address: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EsploraVin {
    txid: String,
    vout: u32,
    prevout: Option<EsploraVout>,
}

#[derive(Debug, Deserialize)]
struct EsploraTx {
    txid: String,
    version: i32,
    size: u64,
    weight: u64,
    locktime: u32,
    fee: Option<u64>,
    status: EsploraTxStatus,
    vin: Vec<EsploraVin>,
    vout: Vec<EsploraVout>,
}

#[derive(Debug, Deserialize)]
struct RecommendedFees {
    #[serde(rename = "fastestFee")]
    fastest_fee: u64,
    #[serde(rename = "halfHourFee")]
    half_hour_fee: u64,
    #[serde(rename = "hourFee")]
    hour_fee: u64,
    #[serde(rename = "economyFee")]
    economy_fee: u64,
    #[serde(rename = "minimumFee")]
    minimum_fee: u64,
}

impl From<EsploraVout> for TxOutputSummary {
    fn from(v: EsploraVout) -> Self {
        TxOutputSummary {
            value_sat: v.value,
            script_hex: v.scriptpubkey,
            address: v.scriptpubkey_address,
        }
    }
}

impl From<EsploraTx> for TxSummary {
    fn from(tx: EsploraTx) -> Self {
        TxSummary {
            txid: tx.txid,
            version: tx.version,
            size: tx.size,
            // Esplora reports weight, not vsize.
            vsize: (tx.weight + 3) / 4,
            weight: tx.weight,
            lock_time: tx.locktime,
            fee_sat: tx.fee,
            confirmed: tx.status.confirmed,
            block_height: tx.status.block_height,
            block_hash: tx.status.block_hash,
            inputs: tx
                .vin
                .into_iter()
                .map(|i| TxInputSummary {
                    txid: i.txid,
                    vout: i.vout,
                    prevout: i.prevout.map(Into::into),
                })
                .collect(),
            outputs: tx.vout.into_iter().map(Into::into).collect(),
        }
    }
}

impl EsploraBackend {
    pub fn new(config: &BackendConfig) -> Result<Self, BackendError> {
        let base_url = config
            .url
            .as_deref()
            .ok_or_else(|| BackendError::Config("esplora backend requires a url".into()))?
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

    async fn tip_height(&self) -> Result<u64, BackendError> {
        let text = http::get_text(&self.client, &self.url("/blocks/tip/height")).await?;
        text.parse()
            .map_err(|e| BackendError::Decode(format!("tip height: {e}")))
    }
}

#[async_trait]
impl Backend for EsploraBackend {
    async fn connect(&self) -> Result<(), BackendError> {
        // A tip probe doubles as a reachability check.
        let height = self.tip_height().await?;
        tracing::info!(url = %self.base_url, height, "esplora backend connected");
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
        let info: EsploraAddress =
            http::get_json(&self.client, &self.url(&format!("/address/{address}"))).await?;
        Ok(AddressInfo {
            address: address.to_string(),
            confirmed: i128::from(info.chain_stats.funded_txo_sum)
                - i128::from(info.chain_stats.spent_txo_sum),
            unconfirmed: i128::from(info.mempool_stats.funded_txo_sum)
                - i128::from(info.mempool_stats.spent_txo_sum),
            tx_count: info.chain_stats.tx_count + info.mempool_stats.tx_count,
        })
    }

    async fn address_utxos(&self, address: &str) -> Result<Vec<UtxoEntry>, BackendError> {
        self.ensure_connected()?;
        let utxos: Vec<EsploraUtxo> =
            http::get_json(&self.client, &self.url(&format!("/address/{address}/utxo"))).await?;
        let tip = if utxos.iter().any(|u| u.status.confirmed) {
            self.tip_height().await?
        } else {
            0
        };
        Ok(utxos
            .into_iter()
            .map(|u| {
                let confirmations = match (u.status.confirmed, u.status.block_height) {
                    (true, Some(height)) => tip.saturating_sub(height) + 1,
                    (true, None) => 1,
                    (false, _) => 0,
                };
                UtxoEntry {
                    txid: u.txid,
                    vout: u.vout,
                    amount_sat: u.value,
                    address: address.to_string(),
                    script_hex: None,
                    confirmations,
                    block_height: u.status.block_height,
                }
            })
            .collect())
    }

    async fn address_txs(
        &self,
        address: &str,
        cursor: Option<&str>,
    ) -> Result<Vec<TxSummary>, BackendError> {
        self.ensure_connected()?;
        let url = match cursor {
            Some(last_txid) => self.url(&format!("/address/{address}/txs/chain/{last_txid}")),
            None => self.url(&format!("/address/{address}/txs")),
        };
        let txs: Vec<EsploraTx> = http::get_json(&self.client, &url).await?;
        Ok(txs.into_iter().map(Into::into).collect())
    }

    async fn transaction(&self, txid: &str) -> Result<TxSummary, BackendError> {
        self.ensure_connected()?;
        let tx: EsploraTx =
            http::get_json(&self.client, &self.url(&format!("/tx/{txid}"))).await?;
        Ok(tx.into())
    }

    async fn raw_transaction(&self, txid: &str) -> Result<Vec<u8>, BackendError> {
        self.ensure_connected()?;
        let text = http::get_text(&self.client, &self.url(&format!("/tx/{txid}/hex"))).await?;
        hex::decode(&text).map_err(|e| BackendError::Decode(format!("raw tx hex: {e}")))
    }

    async fn broadcast(&self, raw_hex: &str) -> Result<String, BackendError> {
        self.ensure_connected()?;
        let result =
            http::post_text_body(&self.client, &self.url("/tx"), raw_hex.to_string()).await;
        match result {
            Ok(txid) => {
                tracing::info!(%txid, "transaction broadcast");
                Ok(txid)
            }
            Err(BackendError::Transport { body, .. }) => Err(BackendError::Broadcast(body)),
            Err(e) => Err(e),
        }
    }

    async fn block_height(&self) -> Result<u64, BackendError> {
        self.ensure_connected()?;
        self.tip_height().await
    }

    async fn block_header(&self, locator: HeaderLocator) -> Result<BlockHeaderInfo, BackendError> {
        self.ensure_connected()?;
        let (hash, height) = match locator {
            HeaderLocator::Height(height) => {
                let hash = http::get_text(
                    &self.client,
                    &self.url(&format!("/block-height/{height}")),
                )
                .await?;
                (hash, Some(height))
            }
            HeaderLocator::Hash(hash) => (hash, None),
        };
        let header_hex =
            http::get_text(&self.client, &self.url(&format!("/block/{hash}/header"))).await?;
        let raw = hex::decode(&header_hex)
            .map_err(|e| BackendError::Decode(format!("header hex: {e}")))?;
        BlockHeaderInfo::from_raw(&raw, height)
    }

    async fn fee_estimates(&self) -> Result<FeeEstimates, BackendError> {
        self.ensure_connected()?;
        let fees: RecommendedFees =
            http::get_json(&self.client, &self.url("/v1/fees/recommended")).await?;
        // Already sat/vB, no conversion.
        Ok(FeeEstimates {
            fastest: fees.fastest_fee,
            half_hour: fees.half_hour_fee,
            hour: fees.hour_fee,
            economy: fees.economy_fee,
            minimum: fees.minimum_fee,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_schema_decodes() {
        let raw = r#"{
            "address": "bc1qexample",
            "chain_stats": {"funded_txo_count": 3, "funded_txo_sum": 150000,
                            "spent_txo_count": 1, "spent_txo_sum": 50000, "tx_count": 4},
            "mempool_stats": {"funded_txo_count": 0, "funded_txo_sum": 0,
                              "spent_txo_count": 1, "spent_txo_sum": 20000, "tx_count": 1}
        }"#;
        let info: EsploraAddress = serde_json::from_str(raw).unwrap();
        assert_eq!(
            info.chain_stats.funded_txo_sum - info.chain_stats.spent_txo_sum,
            100_000
        );
        assert_eq!(info.mempool_stats.spent_txo_sum, 20_000);
    }

    #[test]
    fn tx_schema_normalizes_vsize() {
        let raw = r#"{
            "txid": "aa", "version": 2, "size": 222, "weight": 561, "locktime": 0,
            "fee": 330,
            "status": {"confirmed": true, "block_height": 800000, "block_hash": "bb"},
            "vin": [{"txid": "cc", "vout": 1,
                     "prevout": {"value": 10000, "scriptpubkey": "0014aa",
                                 "scriptpubkey_address": "bc1qaa"}}],
            "vout": [{"value": 9670, "scriptpubkey": "0014bb",
                      "scriptpubkey_address": "bc1qbb"}]
        }"#;
        let tx: EsploraTx = serde_json::from_str(raw).unwrap();
        let summary = TxSummary::from(tx);
        assert_eq!(summary.vsize, 141);
        assert_eq!(summary.fee_sat, Some(330));
        assert_eq!(summary.inputs[0].prevout.as_ref().unwrap().value_sat, 10000);
        assert!(summary.confirmed);
    }

    #[test]
    fn recommended_fee_schema_decodes() {
        let raw = r#"{"fastestFee": 25, "halfHourFee": 18, "hourFee": 12,
                      "economyFee": 6, "minimumFee": 2}"#;
        let fees: RecommendedFees = serde_json::from_str(raw).unwrap();
        assert_eq!(fees.fastest_fee, 25);
        assert_eq!(fees.minimum_fee, 2);
    }

    #[test]
    fn missing_url_is_a_config_error() {
        let config: BackendConfig =
            serde_json::from_str(r#"{"symbol": "BTC", "kind": "esplora"}"#).unwrap();
        assert!(matches!(
            EsploraBackend::new(&config),
            Err(BackendError::Config(_))
        ));
    }
}
