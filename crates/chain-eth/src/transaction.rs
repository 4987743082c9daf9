//! EIP-1559 transaction encoding and signing.
//!
//! Signing payload is `0x02 || rlp(unsigned fields)`, hashed with
//! keccak256 and signed over secp256k1; the broadcast form appends
//! `y_parity, r, s` to the field list under the same type prefix.

use alloy_rlp::{Encodable, RlpEncodable};
use k256::ecdsa::signature::hazmat::PrehashSigner;
use k256::ecdsa::{RecoveryId, Signature, SigningKey};
use sha3::{Digest, Keccak256};
use zeroize::Zeroize;

use crate::address::EvmAddress;
use crate::error::EthError;

/// An unsigned type-2 transaction.
#[derive(Debug, Clone)]
pub struct Eip1559Tx {
    pub chain_id: u64,
    pub nonce: u64,
    pub max_priority_fee_per_gas: u128,
    pub max_fee_per_gas: u128,
    pub gas_limit: u64,
    pub to: EvmAddress,
    /// Value in wei.
    pub value: u128,
    /// Calldata; empty for plain transfers.
    pub data: Vec<u8>,
}

/// A signed transaction ready for `eth_sendRawTransaction`.
#[derive(Debug)]
pub struct SignedEip1559Tx {
    /// `0x02 || rlp(...)`, the exact broadcast bytes.
    pub raw: Vec<u8>,
    /// keccak256 of the raw bytes, 0x-prefixed.
    pub hash: String,
}

/// Intrinsic gas for a calldata-free transfer.
pub const PLAIN_TRANSFER_GAS: u64 = 21_000;

impl Eip1559Tx {
    /// Plain value transfer with empty calldata.
    pub fn transfer(
        chain_id: u64,
        nonce: u64,
        to: EvmAddress,
        value_wei: u128,
        max_priority_fee: u128,
        max_fee: u128,
        gas_limit: u64,
    ) -> Result<Self, EthError> {
        if max_fee < max_priority_fee {
            return Err(EthError::EncodingError(format!(
                "max fee {max_fee} below priority fee {max_priority_fee}"
            )));
        }
        Ok(Self {
            chain_id,
            nonce,
            max_priority_fee_per_gas: max_priority_fee,
            max_fee_per_gas: max_fee,
            gas_limit,
            to,
            value: value_wei,
            data: Vec::new(),
        })
    }

    /// Contract call carrying calldata and no value.
    pub fn contract_call(
        chain_id: u64,
        nonce: u64,
        contract: EvmAddress,
        data: Vec<u8>,
        max_priority_fee: u128,
        max_fee: u128,
        gas_limit: u64,
    ) -> Result<Self, EthError> {
        if max_fee < max_priority_fee {
            return Err(EthError::EncodingError(format!(
                "max fee {max_fee} below priority fee {max_priority_fee}"
            )));
        }
        Ok(Self {
            chain_id,
            nonce,
            max_priority_fee_per_gas: max_priority_fee,
            max_fee_per_gas: max_fee,
            gas_limit,
            to: contract,
            value: 0,
            data,
        })
    }

    /// The exact bytes whose keccak256 gets signed.
    pub fn signing_payload(&self) -> Vec<u8> {
        let fields = UnsignedFields {
            chain_id: self.chain_id,
            nonce: self.nonce,
            max_priority_fee_per_gas: self.max_priority_fee_per_gas,
            max_fee_per_gas: self.max_fee_per_gas,
            gas_limit: self.gas_limit,
            to: RlpAddress(*self.to.as_bytes()),
            value: self.value,
            data: self.data.clone(),
            access_list: Vec::new(),
        };
        let mut rlp_buf = Vec::new();
        fields.encode(&mut rlp_buf);

        let mut payload = Vec::with_capacity(1 + rlp_buf.len());
        payload.push(0x02);
        payload.extend_from_slice(&rlp_buf);
        payload
    }

    /// Sign with a raw secp256k1 secret.
    pub fn sign(&self, private_key: &[u8; 32]) -> Result<SignedEip1559Tx, EthError> {
        let msg_hash = Keccak256::digest(self.signing_payload());

        let mut key_bytes = *private_key;
        let signing_key = SigningKey::from_bytes((&key_bytes).into())
            .map_err(|e| EthError::InvalidPrivateKey(e.to_string()))?;
        key_bytes.zeroize();

        let (signature, recovery_id): (Signature, RecoveryId) = signing_key
            .sign_prehash(msg_hash.as_slice())
            .map_err(|e| EthError::SigningError(e.to_string()))?;

        let mut r_bytes = [0u8; 32];
        let mut s_bytes = [0u8; 32];
        r_bytes.copy_from_slice(&signature.r().to_bytes());
        s_bytes.copy_from_slice(&signature.s().to_bytes());

        let fields = SignedFields {
            chain_id: self.chain_id,
            nonce: self.nonce,
            max_priority_fee_per_gas: self.max_priority_fee_per_gas,
            max_fee_per_gas: self.max_fee_per_gas,
            gas_limit: self.gas_limit,
            to: RlpAddress(*self.to.as_bytes()),
            value: self.value,
            data: self.data.clone(),
            access_list: Vec::new(),
            signature_y_parity: recovery_id.is_y_odd() as u8,
            signature_r: RlpU256(r_bytes),
            signature_s: RlpU256(s_bytes),
        };
        let mut rlp_buf = Vec::new();
        fields.encode(&mut rlp_buf);

        let mut raw = Vec::with_capacity(1 + rlp_buf.len());
        raw.push(0x02);
        raw.extend_from_slice(&rlp_buf);

        let hash = format!("0x{}", hex::encode(Keccak256::digest(&raw)));
        Ok(SignedEip1559Tx { raw, hash })
    }
}

#[derive(RlpEncodable)]
struct UnsignedFields {
    chain_id: u64,
    nonce: u64,
    max_priority_fee_per_gas: u128,
    max_fee_per_gas: u128,
    gas_limit: u64,
    to: RlpAddress,
    value: u128,
    data: Vec<u8>,
    access_list: Vec<AccessListItem>,
}

#[derive(RlpEncodable)]
struct SignedFields {
    chain_id: u64,
    nonce: u64,
    max_priority_fee_per_gas: u128,
    max_fee_per_gas: u128,
    gas_limit: u64,
    to: RlpAddress,
    value: u128,
    data: Vec<u8>,
    access_list: Vec<AccessListItem>,
    signature_y_parity: u8,
    signature_r: RlpU256,
    signature_s: RlpU256,
}

/// EIP-2930 access list entry; always empty here but required in the RLP
/// field order.
#[derive(Debug, Clone, RlpEncodable)]
struct AccessListItem {
    address: RlpAddress,
    storage_keys: Vec<RlpFixedBytes<32>>,
}

#[derive(Debug, Clone)]
struct RlpAddress([u8; 20]);

impl Encodable for RlpAddress {
    fn encode(&self, out: &mut dyn alloy_rlp::BufMut) {
        self.0.as_slice().encode(out);
    }

    fn length(&self) -> usize {
        self.0.as_slice().length()
    }
}

/// 256-bit integer encoded as minimal big-endian bytes.
#[derive(Debug, Clone)]
struct RlpU256([u8; 32]);

impl Encodable for RlpU256 {
    fn encode(&self, out: &mut dyn alloy_rlp::BufMut) {
        let start = self.0.iter().position(|&b| b != 0).unwrap_or(32);
        self.0[start..].encode(out);
    }

    fn length(&self) -> usize {
        let start = self.0.iter().position(|&b| b != 0).unwrap_or(32);
        self.0[start..].length()
    }
}

#[derive(Debug, Clone)]
struct RlpFixedBytes<const N: usize>([u8; N]);

impl<const N: usize> Encodable for RlpFixedBytes<N> {
    fn encode(&self, out: &mut dyn alloy_rlp::BufMut) {
        self.0.as_slice().encode(out);
    }

    fn length(&self) -> usize {
        self.0.as_slice().length()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::erc20;

    const TEST_KEY: [u8; 32] = {
        let mut key = [0u8; 32];
        key[31] = 1;
        key
    };

    fn dead() -> EvmAddress {
        "0x000000000000000000000000000000000000dEaD".parse().unwrap()
    }

    fn transfer(chain_id: u64, nonce: u64) -> Eip1559Tx {
        Eip1559Tx::transfer(
            chain_id,
            nonce,
            dead(),
            1_000_000_000_000_000_000,
            1_000_000_000,
            50_000_000_000,
            PLAIN_TRANSFER_GAS,
        )
        .unwrap()
    }

    #[test]
    fn signing_payload_starts_with_type_byte() {
        let payload = transfer(1, 0).signing_payload();
        assert_eq!(payload[0], 0x02);
        assert!(payload.len() > 1);
    }

    #[test]
    fn signed_output_shape() {
        let signed = transfer(1, 0).sign(&TEST_KEY).unwrap();
        assert_eq!(signed.raw[0], 0x02);
        assert!(signed.hash.starts_with("0x"));
        assert_eq!(signed.hash.len(), 66);
    }

    #[test]
    fn signing_is_deterministic() {
        let tx = transfer(1, 0);
        let a = tx.sign(&TEST_KEY).unwrap();
        let b = tx.sign(&TEST_KEY).unwrap();
        assert_eq!(a.raw, b.raw);
        assert_eq!(a.hash, b.hash);
    }

    #[test]
    fn nonce_and_chain_change_the_bytes() {
        let base = transfer(1, 0).sign(&TEST_KEY).unwrap();
        assert_ne!(transfer(1, 1).sign(&TEST_KEY).unwrap().raw, base.raw);
        assert_ne!(transfer(137, 0).sign(&TEST_KEY).unwrap().raw, base.raw);
    }

    #[test]
    fn zero_key_rejected() {
        assert!(transfer(1, 0).sign(&[0u8; 32]).is_err());
    }

    #[test]
    fn inverted_fee_caps_rejected() {
        let err = Eip1559Tx::transfer(1, 0, dead(), 0, 200, 100, PLAIN_TRANSFER_GAS);
        assert!(err.is_err());
    }

    #[test]
    fn contract_call_carries_data_and_no_value() {
        let calldata = erc20::encode_transfer(dead(), [0u8; 32]);
        let tx = Eip1559Tx::contract_call(1, 3, dead(), calldata.clone(), 100, 200, 65_000)
            .unwrap();
        assert_eq!(tx.value, 0);
        assert_eq!(tx.data, calldata);
        let signed = tx.sign(&TEST_KEY).unwrap();
        assert!(signed.raw.len() > 68);
    }

    #[test]
    fn rlp_u256_minimal_encoding() {
        let mut buf = Vec::new();
        RlpU256([0u8; 32]).encode(&mut buf);
        assert_eq!(buf, vec![0x80]);

        let mut word = [0u8; 32];
        word[31] = 42;
        buf.clear();
        RlpU256(word).encode(&mut buf);
        assert_eq!(buf, vec![42]);
    }

    #[test]
    fn rlp_address_is_a_20_byte_string() {
        let mut buf = Vec::new();
        RlpAddress([0xde; 20]).encode(&mut buf);
        assert_eq!(buf[0], 0x94);
        assert_eq!(buf.len(), 21);
    }
}
