//! Wallet facade: ties key derivation to the per-family chain engines.
//!
//! Callers hand in a [`KeySource`] and a chain's registered parameters;
//! everything below (derivation paths, script construction, sighash
//! flavors, EIP-155 domains) follows from those two.

pub mod error;
pub mod keys;
pub mod mnemonic;

use chain_btc::bitcoin::Transaction;
use chain_btc::{BuiltTransaction, ScriptType};
use chain_eth::{Eip1559Tx, EvmAddress, SignedEip1559Tx};
use chain_params::ChainParams;
use k256::elliptic_curve::sec1::ToEncodedPoint;
use zeroize::Zeroize;

pub use error::WalletError;
pub use keys::{derive_key, DerivedKey, HdKeySource, KeyPath, KeySource};
pub use mnemonic::{generate_mnemonic, mnemonic_to_seed, validate_mnemonic, Seed};

/// Derivation purpose for a concrete script template on a chain.
pub fn purpose_for_script(
    params: &ChainParams,
    script_type: ScriptType,
) -> Result<u32, WalletError> {
    match script_type {
        ScriptType::P2tr if params.supports_taproot => Ok(86),
        ScriptType::P2wpkh if params.supports_segwit => Ok(84),
        ScriptType::P2pkh => Ok(44),
        other => Err(WalletError::UnsupportedChain(format!(
            "{} cannot derive {other:?} addresses",
            params.symbol
        ))),
    }
}

/// The script template new receive addresses use on this chain.
pub fn default_script_type(params: &ChainParams) -> ScriptType {
    if params.supports_segwit {
        ScriptType::P2wpkh
    } else {
        ScriptType::P2pkh
    }
}

fn key_path(
    params: &ChainParams,
    script_type: ScriptType,
    account: u32,
    change: u32,
    index: u32,
) -> Result<KeyPath, WalletError> {
    Ok(KeyPath {
        purpose: purpose_for_script(params, script_type)?,
        coin_type: params.coin_type,
        account,
        change,
        index,
    })
}

/// scriptPubKey of the wallet address at the given coordinates.
pub fn wallet_script(
    params: &ChainParams,
    source: &dyn KeySource,
    script_type: ScriptType,
    account: u32,
    change: u32,
    index: u32,
) -> Result<Vec<u8>, WalletError> {
    let key = source.key_at(key_path(params, script_type, account, change, index)?)?;
    chain_btc::script_for_pubkey(&key.public_key_compressed, script_type).map_err(Into::into)
}

/// Wallet address at the given coordinates, rendered for this chain.
pub fn wallet_address(
    params: &ChainParams,
    source: &dyn KeySource,
    script_type: ScriptType,
    account: u32,
    change: u32,
    index: u32,
) -> Result<String, WalletError> {
    let script = wallet_script(params, source, script_type, account, change, index)?;
    chain_btc::address_for_script(&script, params).map_err(Into::into)
}

/// Sign a built UTXO transaction, deriving one key per input.
pub fn sign_utxo_transaction(
    params: &ChainParams,
    source: &dyn KeySource,
    built: &BuiltTransaction,
) -> Result<Transaction, WalletError> {
    let mut secrets: Vec<[u8; 32]> = Vec::with_capacity(built.coins.len());
    for coin in &built.coins {
        let key = source.key_at(key_path(
            params,
            coin.script_type,
            coin.account,
            coin.change,
            coin.index,
        )?)?;
        secrets.push(key.private_key);
    }

    let result = chain_btc::sign_transaction(built, &secrets);
    for secret in &mut secrets {
        secret.zeroize();
    }
    result.map_err(Into::into)
}

/// Build and sign a payment in one step.
pub fn send(
    params: &ChainParams,
    source: &dyn KeySource,
    available: &[chain_btc::AddressUtxo],
    recipient: &str,
    amount_sat: u64,
    change_address: &str,
    fee_rate_sat_vb: u64,
) -> Result<(Transaction, u64), WalletError> {
    let built = chain_btc::build_transaction(
        params,
        available,
        recipient,
        amount_sat,
        change_address,
        fee_rate_sat_vb,
    )?;
    let signed = sign_utxo_transaction(params, source, &built)?;
    Ok((signed, built.fee_sat))
}

/// Build and sign a whole-wallet sweep.
pub fn send_max(
    params: &ChainParams,
    source: &dyn KeySource,
    available: &[chain_btc::AddressUtxo],
    recipient: &str,
    fee_rate_sat_vb: u64,
) -> Result<(Transaction, u64), WalletError> {
    let built = chain_btc::build_send_max(params, available, recipient, fee_rate_sat_vb)?;
    let signed = sign_utxo_transaction(params, source, &built)?;
    Ok((signed, built.fee_sat))
}

fn evm_key(
    params: &ChainParams,
    source: &dyn KeySource,
    account: u32,
    index: u32,
) -> Result<DerivedKey, WalletError> {
    source.key_at(KeyPath {
        purpose: params.purpose,
        coin_type: params.coin_type,
        account,
        change: 0,
        index,
    })
}

fn evm_chain_id(params: &ChainParams) -> Result<u64, WalletError> {
    params
        .evm_chain_id
        .ok_or_else(|| WalletError::UnsupportedChain(format!("{} has no EVM chain id", params.symbol)))
}

/// Account address at the given coordinates on an EVM chain.
pub fn evm_address(
    params: &ChainParams,
    source: &dyn KeySource,
    account: u32,
    index: u32,
) -> Result<EvmAddress, WalletError> {
    let key = evm_key(params, source, account, index)?;
    let point = k256::PublicKey::from_sec1_bytes(&key.public_key_compressed)
        .map_err(|e| WalletError::DerivationFailed(e.to_string()))?
        .to_encoded_point(false);
    let uncompressed: [u8; 65] = point
        .as_bytes()
        .try_into()
        .map_err(|_| WalletError::DerivationFailed("bad uncompressed point".into()))?;
    EvmAddress::from_uncompressed_pubkey(&uncompressed).map_err(Into::into)
}

/// Sign a plain value transfer on an EVM chain.
#[allow(clippy::too_many_arguments)]
pub fn sign_evm_transfer(
    params: &ChainParams,
    source: &dyn KeySource,
    account: u32,
    index: u32,
    nonce: u64,
    to: &str,
    value_wei: u128,
    max_priority_fee: u128,
    max_fee: u128,
) -> Result<SignedEip1559Tx, WalletError> {
    let to: EvmAddress = to.parse::<EvmAddress>().map_err(WalletError::from)?;
    let tx = Eip1559Tx::transfer(
        evm_chain_id(params)?,
        nonce,
        to,
        value_wei,
        max_priority_fee,
        max_fee,
        chain_eth::PLAIN_TRANSFER_GAS,
    )?;
    let key = evm_key(params, source, account, index)?;
    tx.sign(&key.private_key).map_err(Into::into)
}

/// Sign an ERC-20 `transfer` on an EVM chain.
#[allow(clippy::too_many_arguments)]
pub fn sign_erc20_transfer(
    params: &ChainParams,
    source: &dyn KeySource,
    account: u32,
    index: u32,
    nonce: u64,
    token_contract: &str,
    to: &str,
    amount: [u8; 32],
    max_priority_fee: u128,
    max_fee: u128,
    gas_limit: u64,
) -> Result<SignedEip1559Tx, WalletError> {
    let contract: EvmAddress = token_contract.parse::<EvmAddress>().map_err(WalletError::from)?;
    let to: EvmAddress = to.parse::<EvmAddress>().map_err(WalletError::from)?;
    let calldata = chain_eth::erc20::encode_transfer(to, amount);
    let tx = Eip1559Tx::contract_call(
        evm_chain_id(params)?,
        nonce,
        contract,
        calldata,
        max_priority_fee,
        max_fee,
        gas_limit,
    )?;
    let key = evm_key(params, source, account, index)?;
    tx.sign(&key.private_key).map_err(Into::into)
}
