//! Input signing for the three supported spend paths.
//!
//! Legacy P2PKH inputs sign the pre-segwit sighash, P2WPKH inputs the
//! BIP-143 digest, and P2TR inputs the BIP-341 key-spend digest with the
//! BIP-86 tweak (no script tree). Every key is checked against the prevout
//! it claims to spend before any signature is produced.

use bitcoin::hashes::{hash160, Hash};
use bitcoin::key::TapTweak;
use bitcoin::script::{Builder, PushBytesBuf};
use bitcoin::secp256k1::{All, Keypair, Message, Secp256k1, SecretKey, XOnlyPublicKey};
use bitcoin::sighash::{Prevouts, SighashCache};
use bitcoin::{EcdsaSighashType, TapSighashType, Transaction, Witness};

use crate::builder::BuiltTransaction;
use crate::error::BtcError;
use crate::script::ScriptType;

/// Sign every input of a built transaction.
///
/// `keys` holds raw 32-byte secrets, index-aligned with the inputs. Each
/// key must control the prevout at its position or signing fails before
/// anything is signed.
pub fn sign_transaction(
    built: &BuiltTransaction,
    keys: &[[u8; 32]],
) -> Result<Transaction, BtcError> {
    if keys.len() != built.coins.len() {
        return Err(BtcError::SigningError(format!(
            "{} keys for {} inputs",
            keys.len(),
            built.coins.len()
        )));
    }

    let secp = Secp256k1::new();

    // All key/script pairs are verified up front so a mismatch can never
    // leave a half-signed transaction.
    for (i, (coin, key)) in built.coins.iter().zip(keys).enumerate() {
        verify_key_controls_prevout(&secp, key, coin.script_type, &coin.utxo.script_pubkey)
            .map_err(|e| BtcError::SigningError(format!("input {i}: {e}")))?;
    }

    let mut signed = built.tx.clone();
    let mut cache = SighashCache::new(&built.tx);

    for (i, (coin, key)) in built.coins.iter().zip(keys).enumerate() {
        match coin.script_type {
            ScriptType::P2pkh => {
                let script_sig = sign_p2pkh(&secp, &mut cache, built, i, key)?;
                signed.input[i].script_sig = script_sig;
            }
            ScriptType::P2wpkh => {
                signed.input[i].witness = sign_p2wpkh(&secp, &mut cache, built, i, key)?;
            }
            ScriptType::P2tr => {
                signed.input[i].witness = sign_p2tr(&secp, &mut cache, built, i, key)?;
            }
            ScriptType::P2sh | ScriptType::P2wsh => {
                return Err(BtcError::SigningError(format!(
                    "input {i}: script-hash spends are not supported"
                )));
            }
        }
    }

    Ok(signed)
}

fn secret_key(key: &[u8; 32]) -> Result<SecretKey, BtcError> {
    SecretKey::from_slice(key).map_err(|e| BtcError::InvalidPrivateKey(e.to_string()))
}

fn verify_key_controls_prevout(
    secp: &Secp256k1<All>,
    key: &[u8; 32],
    script_type: ScriptType,
    script_pubkey: &[u8],
) -> Result<(), BtcError> {
    let sk = secret_key(key)?;
    let pubkey = sk.public_key(secp);
    let mismatch = || BtcError::SigningError("key does not control this output".into());

    match script_type {
        ScriptType::P2pkh => {
            let hash = hash160::Hash::hash(&pubkey.serialize());
            if script_pubkey.len() != 25 || script_pubkey[3..23] != hash[..] {
                return Err(mismatch());
            }
        }
        ScriptType::P2wpkh => {
            let hash = hash160::Hash::hash(&pubkey.serialize());
            if script_pubkey.len() != 22 || script_pubkey[2..22] != hash[..] {
                return Err(mismatch());
            }
        }
        ScriptType::P2tr => {
            let keypair = Keypair::from_secret_key(secp, &sk);
            let tweaked = keypair.tap_tweak(secp, None);
            let (output_key, _) = XOnlyPublicKey::from_keypair(&tweaked.to_inner());
            if script_pubkey.len() != 34 || script_pubkey[2..34] != output_key.serialize() {
                return Err(mismatch());
            }
        }
        ScriptType::P2sh | ScriptType::P2wsh => {
            return Err(BtcError::SigningError(
                "script-hash spends are not supported".into(),
            ));
        }
    }
    Ok(())
}

fn sign_p2pkh(
    secp: &Secp256k1<All>,
    cache: &mut SighashCache<&Transaction>,
    built: &BuiltTransaction,
    index: usize,
    key: &[u8; 32],
) -> Result<bitcoin::ScriptBuf, BtcError> {
    let sk = secret_key(key)?;
    let script_pubkey = &built.prevouts[index].script_pubkey;

    let sighash = cache
        .legacy_signature_hash(index, script_pubkey, EcdsaSighashType::All.to_u32())
        .map_err(|e| BtcError::SigningError(format!("legacy sighash: {e}")))?;
    let msg = Message::from_digest(sighash.to_byte_array());
    let signature = bitcoin::ecdsa::Signature {
        signature: secp.sign_ecdsa(&msg, &sk),
        sighash_type: EcdsaSighashType::All,
    };

    let sig_push = PushBytesBuf::try_from(signature.to_vec())
        .map_err(|e| BtcError::SigningError(format!("signature push: {e}")))?;
    let pk_push = PushBytesBuf::try_from(sk.public_key(secp).serialize().to_vec())
        .map_err(|e| BtcError::SigningError(format!("pubkey push: {e}")))?;
    Ok(Builder::new()
        .push_slice(sig_push)
        .push_slice(pk_push)
        .into_script())
}

fn sign_p2wpkh(
    secp: &Secp256k1<All>,
    cache: &mut SighashCache<&Transaction>,
    built: &BuiltTransaction,
    index: usize,
    key: &[u8; 32],
) -> Result<Witness, BtcError> {
    let sk = secret_key(key)?;
    let prevout = &built.prevouts[index];

    let sighash = cache
        .p2wpkh_signature_hash(
            index,
            &prevout.script_pubkey,
            prevout.value,
            EcdsaSighashType::All,
        )
        .map_err(|e| BtcError::SigningError(format!("bip143 sighash: {e}")))?;
    let msg = Message::from_digest(sighash.to_byte_array());
    let signature = bitcoin::ecdsa::Signature {
        signature: secp.sign_ecdsa(&msg, &sk),
        sighash_type: EcdsaSighashType::All,
    };

    Ok(Witness::p2wpkh(&signature, &sk.public_key(secp)))
}

fn sign_p2tr(
    secp: &Secp256k1<All>,
    cache: &mut SighashCache<&Transaction>,
    built: &BuiltTransaction,
    index: usize,
    key: &[u8; 32],
) -> Result<Witness, BtcError> {
    let sk = secret_key(key)?;
    let keypair = Keypair::from_secret_key(secp, &sk);
    let tweaked = keypair.tap_tweak(secp, None);

    let sighash = cache
        .taproot_key_spend_signature_hash(
            index,
            &Prevouts::All(&built.prevouts),
            TapSighashType::Default,
        )
        .map_err(|e| BtcError::SigningError(format!("bip341 sighash: {e}")))?;
    let msg = Message::from_digest(sighash.to_byte_array());
    let signature = bitcoin::taproot::Signature {
        signature: secp.sign_schnorr(&msg, &tweaked.to_inner()),
        sighash_type: TapSighashType::Default,
    };

    Ok(Witness::p2tr_key_spend(&signature))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::build_transaction;
    use crate::coin::{AddressUtxo, Utxo};
    use chain_params::{ChainParams, ChainRegistry, Network};
    use std::sync::Arc;

    const RECIPIENT: &str = "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4";
    const CHANGE: &str = "bc1p0xlxvlhemja6c4dqv22uapctqupfhlxm9h8z3k2e72q4k9hcz7vqzk5jj0";

    fn btc() -> Arc<ChainParams> {
        ChainRegistry::builtin().get("BTC", Network::Mainnet).unwrap()
    }

    fn test_key(fill: u8) -> [u8; 32] {
        let mut key = [0u8; 32];
        key[31] = fill; // small scalars are valid secp keys
        key[0] = fill;
        key
    }

    fn script_for_key(key: &[u8; 32], script_type: ScriptType) -> Vec<u8> {
        let secp = Secp256k1::new();
        let sk = SecretKey::from_slice(key).unwrap();
        match script_type {
            ScriptType::P2pkh => {
                let hash = hash160::Hash::hash(&sk.public_key(&secp).serialize());
                let mut s = vec![0x76, 0xa9, 0x14];
                s.extend_from_slice(&hash[..]);
                s.extend_from_slice(&[0x88, 0xac]);
                s
            }
            ScriptType::P2wpkh => {
                let hash = hash160::Hash::hash(&sk.public_key(&secp).serialize());
                let mut s = vec![0x00, 0x14];
                s.extend_from_slice(&hash[..]);
                s
            }
            ScriptType::P2tr => {
                let keypair = Keypair::from_secret_key(&secp, &sk);
                let tweaked = keypair.tap_tweak(&secp, None);
                let (output_key, _) = XOnlyPublicKey::from_keypair(&tweaked.to_inner());
                let mut s = vec![0x51, 0x20];
                s.extend_from_slice(&output_key.serialize());
                s
            }
            other => panic!("no test script for {other:?}"),
        }
    }

    fn funded_coin(key: &[u8; 32], script_type: ScriptType, amount_sat: u64) -> AddressUtxo {
        AddressUtxo {
            utxo: Utxo {
                txid: "aa".repeat(32),
                vout: 0,
                amount_sat,
                script_pubkey: script_for_key(key, script_type),
            },
            account: 0,
            change: 0,
            index: 0,
            script_type,
        }
    }

    #[test]
    fn p2wpkh_input_gets_two_witness_items() {
        let key = test_key(1);
        let coins = vec![funded_coin(&key, ScriptType::P2wpkh, 100_000)];
        let built = build_transaction(&btc(), &coins, RECIPIENT, 50_000, CHANGE, 2).unwrap();
        let signed = sign_transaction(&built, &[key]).unwrap();

        assert_eq!(signed.input[0].witness.len(), 2);
        assert!(signed.input[0].script_sig.is_empty());
        // Signature ends with SIGHASH_ALL.
        let sig = signed.input[0].witness.nth(0).unwrap();
        assert_eq!(*sig.last().unwrap(), EcdsaSighashType::All.to_u32() as u8);
    }

    #[test]
    fn p2pkh_input_gets_script_sig() {
        let key = test_key(2);
        let coins = vec![funded_coin(&key, ScriptType::P2pkh, 100_000)];
        let built = build_transaction(&btc(), &coins, RECIPIENT, 50_000, CHANGE, 2).unwrap();
        let signed = sign_transaction(&built, &[key]).unwrap();

        assert!(!signed.input[0].script_sig.is_empty());
        assert!(signed.input[0].witness.is_empty());
    }

    #[test]
    fn p2tr_input_gets_single_64_byte_witness() {
        let key = test_key(3);
        let coins = vec![funded_coin(&key, ScriptType::P2tr, 100_000)];
        let built = build_transaction(&btc(), &coins, RECIPIENT, 50_000, CHANGE, 2).unwrap();
        let signed = sign_transaction(&built, &[key]).unwrap();

        assert_eq!(signed.input[0].witness.len(), 1);
        // Default sighash flavor omits the trailing type byte.
        assert_eq!(signed.input[0].witness.nth(0).unwrap().len(), 64);
    }

    #[test]
    fn mixed_inputs_sign_with_their_own_scheme() {
        let k1 = test_key(4);
        let k2 = test_key(5);
        let mut c1 = funded_coin(&k1, ScriptType::P2wpkh, 60_000);
        let mut c2 = funded_coin(&k2, ScriptType::P2tr, 60_000);
        c1.utxo.txid = "bb".repeat(32);
        c2.utxo.vout = 1;
        let coins = vec![c1, c2];
        let built = build_transaction(&btc(), &coins, RECIPIENT, 100_000, CHANGE, 2).unwrap();

        // Keys must follow selection order, which is value-sorted.
        let keys: Vec<[u8; 32]> = built
            .coins
            .iter()
            .map(|c| match c.script_type {
                ScriptType::P2wpkh => k1,
                ScriptType::P2tr => k2,
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        let signed = sign_transaction(&built, &keys).unwrap();
        assert_eq!(signed.input.len(), 2);
        for (input, coin) in signed.input.iter().zip(&built.coins) {
            match coin.script_type {
                ScriptType::P2wpkh => assert_eq!(input.witness.len(), 2),
                ScriptType::P2tr => assert_eq!(input.witness.len(), 1),
                _ => unreachable!(),
            }
        }
    }

    #[test]
    fn wrong_key_is_rejected_before_signing() {
        let key = test_key(6);
        let coins = vec![funded_coin(&key, ScriptType::P2wpkh, 100_000)];
        let built = build_transaction(&btc(), &coins, RECIPIENT, 50_000, CHANGE, 2).unwrap();

        let err = sign_transaction(&built, &[test_key(7)]).unwrap_err();
        assert!(matches!(err, BtcError::SigningError(_)));
    }

    #[test]
    fn key_count_mismatch_rejected() {
        let key = test_key(8);
        let coins = vec![funded_coin(&key, ScriptType::P2wpkh, 100_000)];
        let built = build_transaction(&btc(), &coins, RECIPIENT, 50_000, CHANGE, 2).unwrap();
        assert!(sign_transaction(&built, &[]).is_err());
    }

    #[test]
    fn zero_key_is_invalid() {
        let key = test_key(9);
        let coins = vec![funded_coin(&key, ScriptType::P2wpkh, 100_000)];
        let built = build_transaction(&btc(), &coins, RECIPIENT, 50_000, CHANGE, 2).unwrap();
        let err = sign_transaction(&built, &[[0u8; 32]]).unwrap_err();
        assert!(matches!(err, BtcError::InvalidPrivateKey(_)));
    }

    #[test]
    fn signing_does_not_mutate_the_unsigned_tx() {
        let key = test_key(10);
        let coins = vec![funded_coin(&key, ScriptType::P2wpkh, 100_000)];
        let built = build_transaction(&btc(), &coins, RECIPIENT, 50_000, CHANGE, 2).unwrap();
        let _ = sign_transaction(&built, &[key]).unwrap();
        assert!(built.tx.input[0].witness.is_empty());
        assert!(built.tx.input[0].script_sig.is_empty());
    }
}
