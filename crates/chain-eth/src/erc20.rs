//! ERC-20 call-data builders.

use crate::abi::{encode_call, AbiToken};
use crate::address::EvmAddress;

/// `transfer(address,uint256)` calldata.
pub fn encode_transfer(to: EvmAddress, amount: [u8; 32]) -> Vec<u8> {
    encode_call(
        "transfer(address,uint256)",
        &[AbiToken::Address(to), AbiToken::Uint256(amount)],
    )
}

/// `balanceOf(address)` calldata.
pub fn encode_balance_of(owner: EvmAddress) -> Vec<u8> {
    encode_call("balanceOf(address)", &[AbiToken::Address(owner)])
}

/// `approve(address,uint256)` calldata.
pub fn encode_approve(spender: EvmAddress, amount: [u8; 32]) -> Vec<u8> {
    encode_call(
        "approve(address,uint256)",
        &[AbiToken::Address(spender), AbiToken::Uint256(amount)],
    )
}
