//! EVM-chain engine: addresses, hex quantities, minimal ABI encoding and
//! EIP-1559 transaction signing.

pub mod abi;
pub mod address;
pub mod erc20;
pub mod error;
pub mod quantity;
pub mod transaction;

pub use address::EvmAddress;
pub use error::EthError;
pub use transaction::{Eip1559Tx, SignedEip1559Tx, PLAIN_TRANSFER_GAS};
