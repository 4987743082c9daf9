//! 20-byte EVM addresses with EIP-55 checksum handling.

use std::fmt;
use std::str::FromStr;

use sha3::{Digest, Keccak256};

use crate::error::EthError;

/// An EVM account or contract address.
///
/// Parsing accepts all-lowercase, all-uppercase, or EIP-55 mixed case; a
/// mixed-case string with a wrong checksum is rejected. Display always
/// renders the EIP-55 form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EvmAddress(pub [u8; 20]);

impl EvmAddress {
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Address controlled by an uncompressed secp256k1 public key: the last
    /// 20 bytes of keccak256 over the 64-byte curve point.
    pub fn from_uncompressed_pubkey(pubkey: &[u8; 65]) -> Result<Self, EthError> {
        if pubkey[0] != 0x04 {
            return Err(EthError::InvalidAddress(
                "public key is not uncompressed SEC1".into(),
            ));
        }
        let digest = Keccak256::digest(&pubkey[1..]);
        let mut addr = [0u8; 20];
        addr.copy_from_slice(&digest[12..]);
        Ok(Self(addr))
    }

    fn checksum_string(&self) -> String {
        let lower = hex::encode(self.0);
        let digest = Keccak256::digest(lower.as_bytes());
        let mut out = String::with_capacity(42);
        out.push_str("0x");
        for (i, c) in lower.chars().enumerate() {
            let nibble = (digest[i / 2] >> (4 * (1 - i % 2))) & 0x0f;
            if c.is_ascii_alphabetic() && nibble >= 8 {
                out.push(c.to_ascii_uppercase());
            } else {
                out.push(c);
            }
        }
        out
    }
}

impl fmt::Display for EvmAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.checksum_string())
    }
}

impl FromStr for EvmAddress {
    type Err = EthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex_str = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .ok_or_else(|| EthError::InvalidAddress("address must start with 0x".into()))?;
        if hex_str.len() != 40 {
            return Err(EthError::InvalidAddress(format!(
                "expected 40 hex characters, got {}",
                hex_str.len()
            )));
        }
        let bytes = hex::decode(hex_str)
            .map_err(|e| EthError::InvalidAddress(format!("invalid hex: {e}")))?;
        let mut addr = [0u8; 20];
        addr.copy_from_slice(&bytes);
        let parsed = Self(addr);

        // Mixed case carries a checksum; verify it. Uniform case does not.
        let has_upper = hex_str.bytes().any(|b| b.is_ascii_uppercase());
        let has_lower = hex_str.bytes().any(|b| b.is_ascii_lowercase());
        if has_upper && has_lower && parsed.checksum_string()[2..] != *hex_str {
            return Err(EthError::InvalidAddress(format!(
                "EIP-55 checksum mismatch in {s}"
            )));
        }
        Ok(parsed)
    }
}
