//! Cross-crate integration tests exercising the full pipeline:
//! mnemonic -> derive key -> build transaction -> sign -> verify output.

use std::sync::Arc;

use chain_btc::coin::{AddressUtxo, Utxo};
use chain_btc::ScriptType;
use chain_params::{ChainParams, ChainRegistry, Network};
use wallet_core::{
    evm_address, generate_mnemonic, send, send_max, sign_erc20_transfer, sign_evm_transfer,
    validate_mnemonic, wallet_address, wallet_script, HdKeySource,
};

const TEST_MNEMONIC: &str =
    "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

fn params(symbol: &str) -> Arc<ChainParams> {
    ChainRegistry::builtin().get(symbol, Network::Mainnet).unwrap()
}

fn source() -> HdKeySource {
    HdKeySource::from_mnemonic(TEST_MNEMONIC, "").unwrap()
}

fn own_coin(
    params: &ChainParams,
    src: &HdKeySource,
    script_type: ScriptType,
    index: u32,
    amount_sat: u64,
) -> AddressUtxo {
    let script = wallet_script(params, src, script_type, 0, 0, index).unwrap();
    AddressUtxo {
        utxo: Utxo {
            txid: "ab".repeat(32),
            vout: index,
            amount_sat,
            script_pubkey: script,
        },
        account: 0,
        change: 0,
        index,
        script_type,
    }
}

#[test]
fn btc_full_pipeline_segwit_payment() {
    // 1. Generate and validate a fresh mnemonic
    let mnemonic = generate_mnemonic().unwrap();
    assert!(validate_mnemonic(&mnemonic));

    // 2. Derive a receive and a change address for a known wallet
    let btc = params("BTC");
    let src = source();
    let receive = wallet_address(&btc, &src, ScriptType::P2wpkh, 0, 0, 0).unwrap();
    assert_eq!(receive, "bc1qcr8te4kr609gcawutmrza0j4xv80jy8z306fyu");
    let change = wallet_address(&btc, &src, ScriptType::P2wpkh, 0, 1, 0).unwrap();
    assert!(change.starts_with("bc1q"));
    assert_ne!(receive, change);

    // 3. Build and sign a payment funded by two of the wallet's own coins
    let coins = vec![
        own_coin(&btc, &src, ScriptType::P2wpkh, 0, 60_000),
        own_coin(&btc, &src, ScriptType::P2wpkh, 1, 90_000),
    ];
    let (signed, fee) = send(
        &btc,
        &src,
        &coins,
        "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4",
        120_000,
        &change,
        5,
    )
    .unwrap();

    // 4. Verify the signed wire shape
    assert_eq!(signed.input.len(), 2);
    for input in &signed.input {
        assert_eq!(input.witness.len(), 2); // signature + pubkey
        assert!(input.script_sig.is_empty());
    }
    let total_in: u64 = coins.iter().map(AddressUtxo::amount_sat).sum();
    let total_out: u64 = signed.output.iter().map(|o| o.value.to_sat()).sum();
    assert_eq!(total_in, total_out + fee);
}

#[test]
fn btc_full_pipeline_taproot_sweep() {
    let btc = params("BTC");
    let src = source();
    let coins = vec![own_coin(&btc, &src, ScriptType::P2tr, 0, 200_000)];

    let (signed, fee) = send_max(
        &btc,
        &src,
        &coins,
        "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4",
        3,
    )
    .unwrap();

    assert_eq!(signed.output.len(), 1);
    assert_eq!(signed.output[0].value.to_sat() + fee, 200_000);
    assert_eq!(signed.input[0].witness.len(), 1); // key-spend schnorr sig
    assert_eq!(signed.input[0].witness.iter().next().unwrap().len(), 64);
}

#[test]
fn eth_full_pipeline_native_transfer() {
    let eth = params("ETH");
    let src = source();

    let addr = evm_address(&eth, &src, 0, 0).unwrap();
    assert_eq!(addr.to_string(), "0x9858EfFD232B4033E47d90003D41EC34EcaEda94");

    let signed = sign_evm_transfer(
        &eth,
        &src,
        0,
        0,
        0,
        "0x000000000000000000000000000000000000dEaD",
        1_000_000_000_000_000_000, // 1 ETH
        1_000_000_000,             // 1 gwei priority
        50_000_000_000,            // 50 gwei max
    )
    .unwrap();

    assert_eq!(signed.raw[0], 0x02); // EIP-1559 type byte
    assert!(signed.raw.len() > 100);
    assert!(signed.hash.starts_with("0x"));
}

#[test]
fn eth_full_pipeline_erc20_transfer() {
    let eth = params("ETH");
    let src = source();
    let mut amount = [0u8; 32];
    amount[29..].copy_from_slice(&[0x0f, 0x42, 0x40]); // 1 USDC, 6 decimals

    let signed = sign_erc20_transfer(
        &eth,
        &src,
        0,
        0,
        5,
        "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48",
        "0x000000000000000000000000000000000000dEaD",
        amount,
        1_000_000_000,
        50_000_000_000,
        65_000,
    )
    .unwrap();

    assert_eq!(signed.raw[0], 0x02);
    assert!(signed.raw.len() > 100);
}

#[test]
fn same_mnemonic_produces_different_addresses_per_chain() {
    let src = source();
    let btc = wallet_address(&params("BTC"), &src, ScriptType::P2wpkh, 0, 0, 0).unwrap();
    let ltc = wallet_address(&params("LTC"), &src, ScriptType::P2wpkh, 0, 0, 0).unwrap();
    let doge = wallet_address(&params("DOGE"), &src, ScriptType::P2pkh, 0, 0, 0).unwrap();
    let eth = evm_address(&params("ETH"), &src, 0, 0).unwrap().to_string();

    assert!(btc.starts_with("bc1"));
    assert!(ltc.starts_with("ltc1"));
    assert!(doge.starts_with('D'));
    assert!(eth.starts_with("0x"));

    assert_ne!(btc, ltc);
    assert_ne!(btc, doge);
    assert_ne!(ltc, doge);
}

#[test]
fn testnet_and_mainnet_addresses_differ() {
    let src = source();
    let main = wallet_address(
        &ChainRegistry::builtin().get("BTC", Network::Mainnet).unwrap(),
        &src,
        ScriptType::P2wpkh,
        0,
        0,
        0,
    )
    .unwrap();
    let test = wallet_address(
        &ChainRegistry::builtin().get("BTC", Network::Testnet).unwrap(),
        &src,
        ScriptType::P2wpkh,
        0,
        0,
        0,
    )
    .unwrap();
    assert!(main.starts_with("bc1"));
    assert!(test.starts_with("tb1"));
    assert_ne!(main, test);
}
