//! Raw block header parsing and proof-of-work checks.
//!
//! Headers arrive from backends as 80 raw bytes. All integer fields are
//! little-endian on the wire; hashes are displayed byte-reversed per
//! convention.

use sha2::{Digest, Sha256};

use crate::error::BtcError;

pub const HEADER_SIZE: usize = 80;

/// Parsed 80-byte block header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHeader {
    pub version: i32,
    /// Previous block hash, internal (little-endian) byte order.
    pub prev_block: [u8; 32],
    /// Merkle root, internal byte order.
    pub merkle_root: [u8; 32],
    pub time: u32,
    /// Compact-encoded difficulty target.
    pub bits: u32,
    pub nonce: u32,
}

impl BlockHeader {
    pub fn parse(bytes: &[u8]) -> Result<Self, BtcError> {
        if bytes.len() != HEADER_SIZE {
            return Err(BtcError::MalformedHeader(format!(
                "expected {HEADER_SIZE} bytes, got {}",
                bytes.len()
            )));
        }
        let mut prev_block = [0u8; 32];
        prev_block.copy_from_slice(&bytes[4..36]);
        let mut merkle_root = [0u8; 32];
        merkle_root.copy_from_slice(&bytes[36..68]);

        let le_u32 = |range: std::ops::Range<usize>| {
            let mut buf = [0u8; 4];
            buf.copy_from_slice(&bytes[range]);
            u32::from_le_bytes(buf)
        };

        Ok(Self {
            version: le_u32(0..4) as i32,
            prev_block,
            merkle_root,
            time: le_u32(68..72),
            bits: le_u32(72..76),
            nonce: le_u32(76..80),
        })
    }

    pub fn parse_hex(hex_str: &str) -> Result<Self, BtcError> {
        let bytes = hex::decode(hex_str.trim())
            .map_err(|e| BtcError::MalformedHeader(format!("invalid hex: {e}")))?;
        Self::parse(&bytes)
    }

    fn serialize(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[0..4].copy_from_slice(&(self.version as u32).to_le_bytes());
        out[4..36].copy_from_slice(&self.prev_block);
        out[36..68].copy_from_slice(&self.merkle_root);
        out[68..72].copy_from_slice(&self.time.to_le_bytes());
        out[72..76].copy_from_slice(&self.bits.to_le_bytes());
        out[76..80].copy_from_slice(&self.nonce.to_le_bytes());
        out
    }

    /// Double-SHA256 of the serialized header, internal byte order.
    pub fn block_hash(&self) -> [u8; 32] {
        let first = Sha256::digest(self.serialize());
        let second = Sha256::digest(first);
        second.into()
    }

    /// Block hash in display order (byte-reversed hex).
    pub fn block_hash_hex(&self) -> String {
        let mut hash = self.block_hash();
        hash.reverse();
        hex::encode(hash)
    }

    /// Previous block hash in display order.
    pub fn prev_block_hex(&self) -> String {
        let mut hash = self.prev_block;
        hash.reverse();
        hex::encode(hash)
    }

    /// Merkle root in display order.
    pub fn merkle_root_hex(&self) -> String {
        let mut root = self.merkle_root;
        root.reverse();
        hex::encode(root)
    }

    /// Expanded 256-bit target from the compact `bits` field, big-endian.
    pub fn target(&self) -> Result<[u8; 32], BtcError> {
        expand_compact_target(self.bits)
    }

    /// Check the header hash against its own claimed target.
    ///
    /// This validates the proof of work only; it does not check the target
    /// against the chain's difficulty schedule.
    pub fn meets_target(&self) -> Result<bool, BtcError> {
        let target = self.target()?;
        let mut hash = self.block_hash();
        hash.reverse();
        Ok(hash <= target)
    }

    /// Difficulty relative to the chain's minimum target.
    ///
    /// Computed by repeated scaling in f64, matching the convention used by
    /// node RPC interfaces. Precision loss past the float mantissa is
    /// accepted; this value is informational.
    pub fn difficulty(&self) -> f64 {
        compact_to_difficulty(self.bits)
    }
}

fn expand_compact_target(bits: u32) -> Result<[u8; 32], BtcError> {
    let exponent = (bits >> 24) as usize;
    let mantissa = bits & 0x007f_ffff;
    if bits & 0x0080_0000 != 0 {
        return Err(BtcError::MalformedHeader(format!(
            "negative compact target {bits:#010x}"
        )));
    }
    if exponent > 32 {
        return Err(BtcError::MalformedHeader(format!(
            "compact target exponent {exponent} overflows 256 bits"
        )));
    }

    let mut target = [0u8; 32];
    let mantissa_bytes = mantissa.to_be_bytes();
    // mantissa occupies the top `exponent` bytes; exponents under 3 shift
    // the mantissa itself right instead.
    for i in 0..3usize {
        let byte = mantissa_bytes[i + 1];
        let pos = 32usize
            .checked_sub(exponent)
            .map(|base| base + i)
            .ok_or_else(|| {
                BtcError::MalformedHeader(format!("bad compact target {bits:#010x}"))
            })?;
        if pos >= 32 {
            if byte != 0 {
                return Err(BtcError::MalformedHeader(format!(
                    "compact target {bits:#010x} loses precision"
                )));
            }
            continue;
        }
        target[pos] = byte;
    }
    Ok(target)
}

/// Difficulty = max_target / target, scaled byte by byte to stay in f64
/// range for any valid exponent.
pub fn compact_to_difficulty(bits: u32) -> f64 {
    let mantissa = bits & 0x00ff_ffff;
    if mantissa == 0 {
        return 0.0;
    }
    let mut shift = (bits >> 24) & 0xff;
    let mut diff = f64::from(0x0000_ffffu32) / mantissa as f64;
    while shift < 29 {
        diff *= 256.0;
        shift += 1;
    }
    while shift > 29 {
        diff /= 256.0;
        shift -= 1;
    }
    diff
}
