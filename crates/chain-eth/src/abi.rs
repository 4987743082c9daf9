//! Minimal ABI call-data encoding.
//!
//! Enough to build static-argument contract calls (token transfers, balance
//! queries) without a full ABI parser. Selectors are computed from the
//! canonical signature string, so callers never hardcode magic bytes.

use sha3::{Digest, Keccak256};

use crate::address::EvmAddress;
use crate::error::EthError;

/// A single static ABI argument, encoded as one 32-byte word.
#[derive(Debug, Clone)]
pub enum AbiToken {
    Address(EvmAddress),
    /// Big-endian 256-bit unsigned integer.
    Uint256([u8; 32]),
    Bool(bool),
}

/// First four bytes of keccak256 over the canonical signature, e.g.
/// `transfer(address,uint256)`.
pub fn selector(signature: &str) -> [u8; 4] {
    let digest = Keccak256::digest(signature.as_bytes());
    [digest[0], digest[1], digest[2], digest[3]]
}

/// Encode `selector(signature) || word(arg0) || word(arg1) || ...`.
pub fn encode_call(signature: &str, args: &[AbiToken]) -> Vec<u8> {
    let mut data = Vec::with_capacity(4 + args.len() * 32);
    data.extend_from_slice(&selector(signature));
    for arg in args {
        data.extend_from_slice(&encode_token(arg));
    }
    data
}

fn encode_token(token: &AbiToken) -> [u8; 32] {
    let mut word = [0u8; 32];
    match token {
        AbiToken::Address(addr) => word[12..].copy_from_slice(addr.as_bytes()),
        AbiToken::Uint256(value) => word = *value,
        AbiToken::Bool(flag) => word[31] = u8::from(*flag),
    }
    word
}

/// Decode a single uint256 return word, as produced by `balanceOf` and
/// similar view calls.
pub fn decode_uint256(data: &[u8]) -> Result<[u8; 32], EthError> {
    if data.len() < 32 {
        return Err(EthError::EncodingError(format!(
            "expected at least 32 bytes for uint256, got {}",
            data.len()
        )));
    }
    let mut word = [0u8; 32];
    word.copy_from_slice(&data[..32]);
    Ok(word)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_selectors() {
        assert_eq!(selector("transfer(address,uint256)"), [0xa9, 0x05, 0x9c, 0xbb]);
        assert_eq!(selector("balanceOf(address)"), [0x70, 0xa0, 0x82, 0x31]);
        assert_eq!(selector("approve(address,uint256)"), [0x09, 0x5e, 0xa7, 0xb3]);
    }

    #[test]
    fn address_word_is_left_padded() {
        let addr: EvmAddress = "0x000000000000000000000000000000000000dEaD"
            .parse()
            .unwrap();
        let word = encode_token(&AbiToken::Address(addr));
        assert_eq!(&word[..12], &[0u8; 12]);
        assert_eq!(&word[12..], addr.as_bytes());
    }

    #[test]
    fn bool_word() {
        assert_eq!(encode_token(&AbiToken::Bool(true))[31], 1);
        assert_eq!(encode_token(&AbiToken::Bool(false)), [0u8; 32]);
    }

    #[test]
    fn call_layout() {
        let addr: EvmAddress = "0x000000000000000000000000000000000000dEaD"
            .parse()
            .unwrap();
        let mut amount = [0u8; 32];
        amount[31] = 100;
        let data = encode_call(
            "transfer(address,uint256)",
            &[AbiToken::Address(addr), AbiToken::Uint256(amount)],
        );
        assert_eq!(data.len(), 68);
        assert_eq!(&data[..4], &[0xa9, 0x05, 0x9c, 0xbb]);
        assert_eq!(data[35], 0xad);
        assert_eq!(data[67], 100);
    }

    #[test]
    fn decode_uint256_takes_first_word() {
        let mut data = vec![0u8; 64];
        data[31] = 7;
        data[63] = 9;
        assert_eq!(decode_uint256(&data).unwrap()[31], 7);
        assert!(decode_uint256(&data[..16]).is_err());
    }
}
