//! Provider-agnostic views of chain state.
//!
//! Every backend variant decodes its own wire schema into these types, so
//! callers never see provider-specific units or field layouts. Amounts are
//! integer smallest units (sat, wei); fee rates are sat per vbyte.

use serde::{Deserialize, Serialize};

use crate::error::BackendError;

/// Balance and activity summary for one address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressInfo {
    pub address: String,
    /// Confirmed balance in smallest units.
    pub confirmed: i128,
    /// Unconfirmed delta in smallest units; negative while outgoing spends
    /// sit in the mempool.
    pub unconfirmed: i128,
    pub tx_count: u64,
}

impl AddressInfo {
    /// Whether the address has ever been touched on chain.
    pub fn has_activity(&self) -> bool {
        self.tx_count > 0 || self.confirmed != 0 || self.unconfirmed != 0
    }
}

/// One unspent output as reported by a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtxoEntry {
    pub txid: String,
    pub vout: u32,
    pub amount_sat: u64,
    pub address: String,
    /// scriptPubKey hex, when the provider reports it.
    pub script_hex: Option<String>,
    pub confirmations: u64,
    pub block_height: Option<u64>,
}

impl UtxoEntry {
    pub fn script_bytes(&self) -> Result<Option<Vec<u8>>, BackendError> {
        match &self.script_hex {
            Some(hex_str) => hex::decode(hex_str)
                .map(Some)
                .map_err(|e| BackendError::Decode(format!("utxo script hex: {e}"))),
            None => Ok(None),
        }
    }
}

/// Normalized view of one transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxSummary {
    pub txid: String,
    pub version: i32,
    pub size: u64,
    pub vsize: u64,
    pub weight: u64,
    pub lock_time: u32,
    pub fee_sat: Option<u64>,
    pub confirmed: bool,
    pub block_height: Option<u64>,
    pub block_hash: Option<String>,
    pub inputs: Vec<TxInputSummary>,
    pub outputs: Vec<TxOutputSummary>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInputSummary {
    pub txid: String,
    pub vout: u32,
    /// The output being spent, when the provider includes it.
    pub prevout: Option<TxOutputSummary>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutputSummary {
    pub value_sat: u64,
    pub script_hex: String,
    pub address: Option<String>,
}

/// Parsed block header plus chain position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockHeaderInfo {
    /// Display-order block hash.
    pub hash: String,
    pub height: Option<u64>,
    pub version: i32,
    /// Display-order previous block hash.
    pub prev_hash: String,
    /// Display-order merkle root.
    pub merkle_root: String,
    pub time: u32,
    pub bits: u32,
    pub nonce: u32,
    pub difficulty: f64,
}

impl BlockHeaderInfo {
    /// Build from 80 raw header bytes via the header verifier.
    pub fn from_raw(raw: &[u8], height: Option<u64>) -> Result<Self, BackendError> {
        let header = chain_btc::BlockHeader::parse(raw)?;
        Ok(Self {
            hash: header.block_hash_hex(),
            height,
            version: header.version,
            prev_hash: header.prev_block_hex(),
            merkle_root: header.merkle_root_hex(),
            time: header.time,
            bits: header.bits,
            nonce: header.nonce,
            difficulty: header.difficulty(),
        })
    }
}

/// How to identify the header being requested. Not every variant supports
/// both forms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderLocator {
    Height(u64),
    Hash(String),
}

/// Fee rates in sat/vB for five confirmation targets.
///
/// A bucket left at zero means the provider could not estimate that target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeEstimates {
    pub fastest: u64,
    pub half_hour: u64,
    pub hour: u64,
    pub economy: u64,
    pub minimum: u64,
}
