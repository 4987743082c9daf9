//! Address <-> scriptPubKey codec, parameterized by chain constants.
//!
//! Legacy addresses go through base58check with the chain's version bytes;
//! witness addresses go through the local bech32 codec with the chain's HRP.
//! Nothing here assumes Bitcoin mainnet.

use bitcoin::base58;
use bitcoin::hashes::{hash160, Hash};
use bitcoin::key::TapTweak;
use bitcoin::secp256k1::{PublicKey, Secp256k1};
use chain_params::ChainParams;

use crate::bech32;
use crate::error::BtcError;

/// Output script shapes this engine understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScriptType {
    P2pkh,
    P2sh,
    P2wpkh,
    P2wsh,
    P2tr,
}

impl ScriptType {
    /// Estimated virtual size contribution of spending one input of this
    /// type, including its share of witness data.
    pub fn input_vbytes(self) -> Result<u64, BtcError> {
        match self {
            ScriptType::P2pkh => Ok(148),
            ScriptType::P2wpkh => Ok(68),
            ScriptType::P2tr => Ok(58),
            ScriptType::P2sh | ScriptType::P2wsh => Err(BtcError::TransactionBuildError(
                format!("cannot estimate spend size for script-hash input {self:?}"),
            )),
        }
    }

    /// Virtual size of one output paying to this script type.
    pub fn output_vbytes(self) -> u64 {
        match self {
            ScriptType::P2pkh => 34,
            ScriptType::P2sh => 32,
            ScriptType::P2wpkh => 31,
            ScriptType::P2wsh | ScriptType::P2tr => 43,
        }
    }
}

/// Classify a raw scriptPubKey by its template.
pub fn detect_script_type(script: &[u8]) -> Option<ScriptType> {
    match script {
        // OP_DUP OP_HASH160 <20> OP_EQUALVERIFY OP_CHECKSIG
        [0x76, 0xa9, 0x14, .., 0x88, 0xac] if script.len() == 25 => Some(ScriptType::P2pkh),
        // OP_HASH160 <20> OP_EQUAL
        [0xa9, 0x14, .., 0x87] if script.len() == 23 => Some(ScriptType::P2sh),
        // OP_0 <20>
        [0x00, 0x14, ..] if script.len() == 22 => Some(ScriptType::P2wpkh),
        // OP_0 <32>
        [0x00, 0x20, ..] if script.len() == 34 => Some(ScriptType::P2wsh),
        // OP_1 <32>
        [0x51, 0x20, ..] if script.len() == 34 => Some(ScriptType::P2tr),
        _ => None,
    }
}

/// Decode an address into its scriptPubKey under the given chain's rules.
pub fn script_for_address(address: &str, params: &ChainParams) -> Result<Vec<u8>, BtcError> {
    if let Some(hrp) = params.bech32_hrp {
        let lowered = address.to_ascii_lowercase();
        if lowered.starts_with(hrp) && lowered.as_bytes().get(hrp.len()) == Some(&b'1') {
            return witness_script(address, hrp, params);
        }
    }
    legacy_script(address, params)
}

fn witness_script(address: &str, hrp: &str, params: &ChainParams) -> Result<Vec<u8>, BtcError> {
    let (version, program) = bech32::decode_witness(address, hrp)?;
    match (version, program.len()) {
        (0, 20) => {
            let mut script = Vec::with_capacity(22);
            script.extend_from_slice(&[0x00, 0x14]);
            script.extend_from_slice(&program);
            Ok(script)
        }
        (0, 32) => {
            let mut script = Vec::with_capacity(34);
            script.extend_from_slice(&[0x00, 0x20]);
            script.extend_from_slice(&program);
            Ok(script)
        }
        (1, 32) => {
            if !params.supports_taproot {
                return Err(BtcError::InvalidAddress(format!(
                    "{} does not support taproot outputs",
                    params.symbol
                )));
            }
            let mut script = Vec::with_capacity(34);
            script.extend_from_slice(&[0x51, 0x20]);
            script.extend_from_slice(&program);
            Ok(script)
        }
        (v, len) => Err(BtcError::InvalidAddress(format!(
            "unsupported witness output: version {v}, program length {len}"
        ))),
    }
}

fn legacy_script(address: &str, params: &ChainParams) -> Result<Vec<u8>, BtcError> {
    let payload = base58::decode_check(address)
        .map_err(|e| BtcError::InvalidAddress(format!("base58check: {e}")))?;
    if payload.len() != 21 {
        return Err(BtcError::InvalidAddress(format!(
            "legacy payload is {} bytes, expected 21",
            payload.len()
        )));
    }
    let (version, hash) = (payload[0], &payload[1..]);
    if version == params.p2pkh_prefix {
        let mut script = Vec::with_capacity(25);
        script.extend_from_slice(&[0x76, 0xa9, 0x14]);
        script.extend_from_slice(hash);
        script.extend_from_slice(&[0x88, 0xac]);
        Ok(script)
    } else if version == params.p2sh_prefix {
        let mut script = Vec::with_capacity(23);
        script.extend_from_slice(&[0xa9, 0x14]);
        script.extend_from_slice(hash);
        script.push(0x87);
        Ok(script)
    } else {
        Err(BtcError::InvalidAddress(format!(
            "version byte {version:#04x} does not match {} {}",
            params.symbol, params.network
        )))
    }
}

/// Render a scriptPubKey as an address under the given chain's rules.
pub fn address_for_script(script: &[u8], params: &ChainParams) -> Result<String, BtcError> {
    let kind = detect_script_type(script).ok_or_else(|| {
        BtcError::InvalidAddress(format!(
            "nonstandard script: {}",
            hex::encode(script)
        ))
    })?;
    match kind {
        ScriptType::P2pkh => {
            let mut payload = Vec::with_capacity(21);
            payload.push(params.p2pkh_prefix);
            payload.extend_from_slice(&script[3..23]);
            Ok(base58::encode_check(&payload))
        }
        ScriptType::P2sh => {
            let mut payload = Vec::with_capacity(21);
            payload.push(params.p2sh_prefix);
            payload.extend_from_slice(&script[2..22]);
            Ok(base58::encode_check(&payload))
        }
        ScriptType::P2wpkh | ScriptType::P2wsh | ScriptType::P2tr => {
            let hrp = params.bech32_hrp.ok_or_else(|| {
                BtcError::InvalidAddress(format!(
                    "{} has no witness address format",
                    params.symbol
                ))
            })?;
            let version = if kind == ScriptType::P2tr { 1 } else { 0 };
            bech32::encode_witness(hrp, version, &script[2..])
        }
    }
}

/// scriptPubKey paying to a compressed public key under the given template.
///
/// P2TR applies the BIP-86 output tweak (no script tree) to the key's
/// x-only form.
pub fn script_for_pubkey(pubkey: &[u8; 33], kind: ScriptType) -> Result<Vec<u8>, BtcError> {
    match kind {
        ScriptType::P2pkh => {
            let hash = hash160::Hash::hash(pubkey);
            let mut script = Vec::with_capacity(25);
            script.extend_from_slice(&[0x76, 0xa9, 0x14]);
            script.extend_from_slice(&hash[..]);
            script.extend_from_slice(&[0x88, 0xac]);
            Ok(script)
        }
        ScriptType::P2wpkh => {
            let hash = hash160::Hash::hash(pubkey);
            let mut script = Vec::with_capacity(22);
            script.extend_from_slice(&[0x00, 0x14]);
            script.extend_from_slice(&hash[..]);
            Ok(script)
        }
        ScriptType::P2tr => {
            let secp = Secp256k1::verification_only();
            let pk = PublicKey::from_slice(pubkey)
                .map_err(|e| BtcError::InvalidPrivateKey(format!("public key: {e}")))?;
            let (xonly, _) = pk.x_only_public_key();
            let (tweaked, _) = xonly.tap_tweak(&secp, None);
            let mut script = Vec::with_capacity(34);
            script.extend_from_slice(&[0x51, 0x20]);
            script.extend_from_slice(&tweaked.serialize());
            Ok(script)
        }
        ScriptType::P2sh | ScriptType::P2wsh => Err(BtcError::InvalidAddress(format!(
            "no single-key script for {kind:?}"
        ))),
    }
}

/// Classify an address string without materializing the script.
pub fn address_script_type(address: &str, params: &ChainParams) -> Result<ScriptType, BtcError> {
    let script = script_for_address(address, params)?;
    detect_script_type(&script)
        .ok_or_else(|| BtcError::InvalidAddress(format!("unclassifiable address {address}")))
}
