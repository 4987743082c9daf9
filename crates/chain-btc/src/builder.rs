//! Unsigned transaction assembly: outputs, coin selection, fee and change.

use std::str::FromStr;

use bitcoin::absolute::LockTime;
use bitcoin::transaction::Version;
use bitcoin::{Amount, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Txid, Witness};
use chain_params::ChainParams;

use crate::coin::{select_coins, AddressUtxo};
use crate::error::BtcError;
use crate::script::{address_script_type, script_for_address};

/// Outputs below this value are uneconomical to spend.
pub const DUST_LIMIT_SAT: u64 = 546;

/// Non-input, non-output virtual size: version, locktime, counts, segwit
/// marker and flag.
pub const TX_OVERHEAD_VBYTES: u64 = 11;

/// Padding added to every size estimate so a rounding shortfall never
/// produces an underpaying transaction.
pub const FEE_MARGIN_VBYTES: u64 = 2;

/// An unsigned transaction plus everything the signer needs.
///
/// `coins` is index-aligned with `tx.input` and `prevouts`.
#[derive(Debug)]
pub struct BuiltTransaction {
    pub tx: Transaction,
    pub prevouts: Vec<TxOut>,
    pub coins: Vec<AddressUtxo>,
    pub fee_sat: u64,
}

impl BuiltTransaction {
    pub fn total_input_sat(&self) -> u64 {
        self.prevouts.iter().map(|p| p.value.to_sat()).sum()
    }

    pub fn total_output_sat(&self) -> u64 {
        self.tx.output.iter().map(|o| o.value.to_sat()).sum()
    }
}

/// Fee for a transaction of the given input/output virtual sizes.
pub fn estimate_fee(input_vbytes: u64, output_vbytes: u64, fee_rate_sat_vb: u64) -> u64 {
    (TX_OVERHEAD_VBYTES + input_vbytes + output_vbytes + FEE_MARGIN_VBYTES) * fee_rate_sat_vb
}

/// Build an unsigned payment of `amount_sat` to `recipient`.
///
/// Coins are selected greedily from `available`. A change output to
/// `change_address` is added unless the remainder is below the dust limit,
/// in which case the remainder is left to the miner.
pub fn build_transaction(
    params: &ChainParams,
    available: &[AddressUtxo],
    recipient: &str,
    amount_sat: u64,
    change_address: &str,
    fee_rate_sat_vb: u64,
) -> Result<BuiltTransaction, BtcError> {
    if amount_sat < DUST_LIMIT_SAT {
        return Err(BtcError::TransactionBuildError(format!(
            "amount {amount_sat} sat is below the dust limit"
        )));
    }
    if fee_rate_sat_vb == 0 {
        return Err(BtcError::TransactionBuildError(
            "fee rate must be at least 1 sat/vB".into(),
        ));
    }

    let recipient_script = script_for_address(recipient, params)?;
    let recipient_vbytes = address_script_type(recipient, params)?.output_vbytes();
    let change_script = script_for_address(change_address, params)?;
    let change_vbytes = address_script_type(change_address, params)?.output_vbytes();

    // Select assuming the change output exists; dropping it later only
    // lowers the real fee rate's floor, never below the requested rate.
    let base_vbytes = recipient_vbytes + change_vbytes + FEE_MARGIN_VBYTES + TX_OVERHEAD_VBYTES;
    let selection = select_coins(available, amount_sat, fee_rate_sat_vb, base_vbytes)?;

    let fee_with_change = estimate_fee(
        selection.input_vbytes,
        recipient_vbytes + change_vbytes,
        fee_rate_sat_vb,
    );
    let remainder = selection
        .total_sat
        .checked_sub(amount_sat + fee_with_change)
        .ok_or_else(|| BtcError::TransactionBuildError("selection underfunded".into()))?;

    let mut output = vec![TxOut {
        value: Amount::from_sat(amount_sat),
        script_pubkey: ScriptBuf::from_bytes(recipient_script),
    }];
    let fee_sat = if remainder >= DUST_LIMIT_SAT {
        output.push(TxOut {
            value: Amount::from_sat(remainder),
            script_pubkey: ScriptBuf::from_bytes(change_script),
        });
        fee_with_change
    } else {
        // Dust remainder is absorbed into the fee.
        fee_with_change + remainder
    };

    finish(selection.coins, output, fee_sat)
}

/// Build an unsigned sweep of every available coin to `recipient`.
///
/// The fee comes out of the swept total; there is no change output.
pub fn build_send_max(
    params: &ChainParams,
    available: &[AddressUtxo],
    recipient: &str,
    fee_rate_sat_vb: u64,
) -> Result<BuiltTransaction, BtcError> {
    if available.is_empty() {
        return Err(BtcError::InsufficientFunds { have: 0, need: 1 });
    }
    if fee_rate_sat_vb == 0 {
        return Err(BtcError::TransactionBuildError(
            "fee rate must be at least 1 sat/vB".into(),
        ));
    }

    let recipient_script = script_for_address(recipient, params)?;
    let recipient_vbytes = address_script_type(recipient, params)?.output_vbytes();

    let mut total_sat: u64 = 0;
    let mut input_vbytes: u64 = 0;
    for coin in available {
        total_sat = total_sat
            .checked_add(coin.amount_sat())
            .ok_or_else(|| BtcError::TransactionBuildError("input total overflow".into()))?;
        input_vbytes += coin.script_type.input_vbytes()?;
    }

    let fee_sat = estimate_fee(input_vbytes, recipient_vbytes, fee_rate_sat_vb);
    let amount_sat = total_sat.checked_sub(fee_sat).unwrap_or(0);
    if amount_sat < DUST_LIMIT_SAT {
        return Err(BtcError::InsufficientFunds {
            have: total_sat,
            need: fee_sat + DUST_LIMIT_SAT,
        });
    }

    let output = vec![TxOut {
        value: Amount::from_sat(amount_sat),
        script_pubkey: ScriptBuf::from_bytes(recipient_script),
    }];
    finish(available.to_vec(), output, fee_sat)
}

fn finish(
    coins: Vec<AddressUtxo>,
    output: Vec<TxOut>,
    fee_sat: u64,
) -> Result<BuiltTransaction, BtcError> {
    let mut input = Vec::with_capacity(coins.len());
    let mut prevouts = Vec::with_capacity(coins.len());
    for coin in &coins {
        let txid = Txid::from_str(&coin.utxo.txid).map_err(|e| {
            BtcError::TransactionBuildError(format!("bad txid {}: {e}", coin.utxo.txid))
        })?;
        input.push(TxIn {
            previous_output: OutPoint {
                txid,
                vout: coin.utxo.vout,
            },
            script_sig: ScriptBuf::new(),
            sequence: Sequence::ENABLE_RBF_NO_LOCKTIME,
            witness: Witness::new(),
        });
        prevouts.push(TxOut {
            value: Amount::from_sat(coin.amount_sat()),
            script_pubkey: ScriptBuf::from_bytes(coin.utxo.script_pubkey.clone()),
        });
    }

    let tx = Transaction {
        version: Version::TWO,
        lock_time: LockTime::ZERO,
        input,
        output,
    };

    let built = BuiltTransaction {
        tx,
        prevouts,
        coins,
        fee_sat,
    };
    // Value conservation must hold exactly before anything gets signed.
    if built.total_input_sat() != built.total_output_sat() + built.fee_sat {
        return Err(BtcError::TransactionBuildError(format!(
            "value mismatch: in {} != out {} + fee {}",
            built.total_input_sat(),
            built.total_output_sat(),
            built.fee_sat
        )));
    }
    Ok(built)
}
