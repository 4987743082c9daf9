//! JSON-RPC hex quantities.
//!
//! EVM node interfaces exchange integers as 0x-prefixed big-endian hex with
//! no leading zeros ("0x0" for zero). These helpers convert between that
//! form and native integers without ever rendering a decimal.

use crate::error::EthError;

/// Render an integer as a minimal hex quantity.
pub fn to_hex_quantity(value: u128) -> String {
    format!("{value:#x}")
}

fn strip_prefix(quantity: &str) -> Result<&str, EthError> {
    let digits = quantity
        .strip_prefix("0x")
        .or_else(|| quantity.strip_prefix("0X"))
        .ok_or_else(|| EthError::InvalidQuantity(format!("missing 0x prefix: {quantity}")))?;
    if digits.is_empty() {
        return Err(EthError::InvalidQuantity(format!("empty quantity: {quantity}")));
    }
    Ok(digits)
}

pub fn parse_u64(quantity: &str) -> Result<u64, EthError> {
    let digits = strip_prefix(quantity)?;
    u64::from_str_radix(digits, 16)
        .map_err(|e| EthError::InvalidQuantity(format!("{quantity}: {e}")))
}

pub fn parse_u128(quantity: &str) -> Result<u128, EthError> {
    let digits = strip_prefix(quantity)?;
    u128::from_str_radix(digits, 16)
        .map_err(|e| EthError::InvalidQuantity(format!("{quantity}: {e}")))
}

/// Parse a quantity of up to 256 bits into a big-endian word.
pub fn parse_u256(quantity: &str) -> Result<[u8; 32], EthError> {
    let digits = strip_prefix(quantity)?;
    if digits.len() > 64 {
        return Err(EthError::InvalidQuantity(format!(
            "{quantity} exceeds 256 bits"
        )));
    }
    let padded = format!("{digits:0>64}");
    let bytes = hex::decode(&padded)
        .map_err(|e| EthError::InvalidQuantity(format!("{quantity}: {e}")))?;
    let mut word = [0u8; 32];
    word.copy_from_slice(&bytes);
    Ok(word)
}
