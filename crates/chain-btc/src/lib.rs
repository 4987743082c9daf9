//! UTXO-chain engine: address/script codec, block-header verification,
//! coin selection, transaction construction and per-script-type signing.
//!
//! Chain constants (prefixes, HRPs, feature flags) come from `chain-params`;
//! nothing here is Bitcoin-mainnet specific. The `bitcoin` crate supplies
//! transaction primitives, sighash computation and base58check.

pub use bitcoin;

pub mod bech32;
pub mod builder;
pub mod coin;
pub mod error;
pub mod header;
pub mod script;
pub mod sign;

pub use builder::{build_send_max, build_transaction, BuiltTransaction, DUST_LIMIT_SAT};
pub use coin::{select_coins, AddressUtxo, Selection, Utxo};
pub use error::BtcError;
pub use header::BlockHeader;
pub use script::{
    address_for_script, detect_script_type, script_for_address, script_for_pubkey, ScriptType,
};
pub use sign::sign_transaction;
