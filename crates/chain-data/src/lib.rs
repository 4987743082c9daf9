//! Chain data access layer.
//!
//! Four interchangeable backend protocols behind one [`Backend`] trait:
//! Esplora-style explorers, Blockbook indexers, Electrum servers, and
//! direct node JSON-RPC (bitcoind-family or EVM). On top of them,
//! [`SyncService`] discovers HD account activity with gap-limit scanning.

pub mod backend;
pub mod blockbook;
pub mod config;
pub mod electrum;
pub mod error;
pub mod esplora;
pub mod fees;
mod http;
pub mod node;
pub mod sync;
pub mod types;

#[cfg(test)]
pub(crate) mod testutil;

pub use backend::{Backend, BackendRegistry};
pub use blockbook::BlockbookBackend;
pub use config::{BackendConfig, BackendKind, ElectrumServer, NodeDialect};
pub use electrum::ElectrumBackend;
pub use error::BackendError;
pub use esplora::EsploraBackend;
pub use fees::coin_per_kb_to_sat_per_vb;
pub use node::NodeRpcBackend;
pub use sync::{
    AddressSource, SyncCursor, SyncReport, SyncService, SyncStore, WalletAddressSource,
    DEFAULT_GAP_LIMIT,
};
pub use types::{
    AddressInfo, BlockHeaderInfo, FeeEstimates, HeaderLocator, TxInputSummary, TxOutputSummary,
    TxSummary, UtxoEntry,
};
