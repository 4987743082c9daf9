//! Spendable output model and greedy coin selection.

use crate::error::BtcError;
use crate::script::ScriptType;

/// One unspent transaction output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utxo {
    /// Funding transaction id, display (big-endian) hex.
    pub txid: String,
    pub vout: u32,
    pub amount_sat: u64,
    pub script_pubkey: Vec<u8>,
}

/// A UTXO annotated with the wallet coordinates that control it.
///
/// The derivation triple locates the private key; `script_type` decides
/// which signer handles the input and what it costs to spend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressUtxo {
    pub utxo: Utxo,
    pub account: u32,
    /// 0 for external (receive), 1 for internal (change).
    pub change: u32,
    pub index: u32,
    pub script_type: ScriptType,
}

impl AddressUtxo {
    pub fn amount_sat(&self) -> u64 {
        self.utxo.amount_sat
    }
}

/// Result of a selection pass: the chosen coins and their summed sizes.
#[derive(Debug)]
pub struct Selection {
    pub coins: Vec<AddressUtxo>,
    pub total_sat: u64,
    pub input_vbytes: u64,
}

/// Greedy largest-first selection.
///
/// Coins are taken in descending value order until the running total covers
/// the target plus the fee implied by the coins taken so far. Larger coins
/// first keeps the input count, and therefore the fee, small.
///
/// `base_vbytes` is the size of everything that is not an input: overhead
/// plus all outputs.
pub fn select_coins(
    available: &[AddressUtxo],
    target_sat: u64,
    fee_rate_sat_vb: u64,
    base_vbytes: u64,
) -> Result<Selection, BtcError> {
    let mut sorted: Vec<&AddressUtxo> = available.iter().collect();
    sorted.sort_by(|a, b| b.amount_sat().cmp(&a.amount_sat()));

    let mut coins = Vec::new();
    let mut total_sat: u64 = 0;
    let mut input_vbytes: u64 = 0;
    let mut needed = target_sat + base_vbytes * fee_rate_sat_vb;

    for coin in sorted {
        input_vbytes += coin.script_type.input_vbytes()?;
        total_sat = total_sat
            .checked_add(coin.amount_sat())
            .ok_or_else(|| BtcError::TransactionBuildError("input total overflow".into()))?;
        coins.push(coin.clone());

        needed = target_sat + (base_vbytes + input_vbytes) * fee_rate_sat_vb;
        if total_sat >= needed {
            return Ok(Selection {
                coins,
                total_sat,
                input_vbytes,
            });
        }
    }

    Err(BtcError::InsufficientFunds {
        have: total_sat,
        need: needed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coin(amount_sat: u64, index: u32, script_type: ScriptType) -> AddressUtxo {
        AddressUtxo {
            utxo: Utxo {
                txid: format!("{index:064x}"),
                vout: 0,
                amount_sat,
                script_pubkey: {
                    let mut s = vec![0x00, 0x14];
                    s.extend_from_slice(&[index as u8; 20]);
                    s
                },
            },
            account: 0,
            change: 0,
            index,
            script_type,
        }
    }

    #[test]
    fn picks_largest_first() {
        let coins = vec![
            coin(10_000, 0, ScriptType::P2wpkh),
            coin(50_000, 1, ScriptType::P2wpkh),
            coin(20_000, 2, ScriptType::P2wpkh),
        ];
        let selection = select_coins(&coins, 30_000, 1, 73).unwrap();
        assert_eq!(selection.coins.len(), 1);
        assert_eq!(selection.coins[0].index, 1);
        assert_eq!(selection.input_vbytes, 68);
    }

    #[test]
    fn accumulates_until_fee_covered() {
        // One coin covers the target but not target plus fee at a high rate.
        let coins = vec![
            coin(30_100, 0, ScriptType::P2wpkh),
            coin(30_000, 1, ScriptType::P2wpkh),
        ];
        let selection = select_coins(&coins, 30_000, 50, 73).unwrap();
        assert_eq!(selection.coins.len(), 2);
        assert!(selection.total_sat >= 30_000 + (73 + 136) * 50);
    }

    #[test]
    fn fee_grows_with_each_input() {
        let coins: Vec<_> = (0..10).map(|i| coin(1_000, i, ScriptType::P2wpkh)).collect();
        let selection = select_coins(&coins, 5_000, 2, 73).unwrap();
        let fee_floor = (73 + selection.input_vbytes) * 2;
        assert!(selection.total_sat >= 5_000 + fee_floor);
    }

    #[test]
    fn mixed_input_types_use_per_type_cost() {
        let coins = vec![
            coin(40_000, 0, ScriptType::P2pkh),
            coin(40_000, 1, ScriptType::P2tr),
        ];
        let selection = select_coins(&coins, 70_000, 1, 73).unwrap();
        assert_eq!(selection.input_vbytes, 148 + 58);
    }

    #[test]
    fn insufficient_funds_reports_shortfall() {
        let coins = vec![coin(1_000, 0, ScriptType::P2wpkh)];
        let err = select_coins(&coins, 100_000, 5, 73).unwrap_err();
        match err {
            BtcError::InsufficientFunds { have, need } => {
                assert_eq!(have, 1_000);
                assert!(need > 100_000);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn script_hash_coin_is_rejected() {
        let coins = vec![coin(50_000, 0, ScriptType::P2wsh)];
        assert!(select_coins(&coins, 10_000, 1, 73).is_err());
    }

    #[test]
    fn empty_wallet_is_insufficient() {
        let err = select_coins(&[], 1, 1, 73).unwrap_err();
        assert!(matches!(err, BtcError::InsufficientFunds { .. }));
    }
}
