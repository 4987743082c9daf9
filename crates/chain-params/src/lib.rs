//! Static per-chain parameters and the process-wide registry.
//!
//! Everything here is immutable after construction: the registry is built
//! once at startup and handed around by shared reference. Chain-specific
//! constants (address prefixes, derivation purpose/coin type, HD magic
//! bytes, feature flags) live in [`ChainParams`]; nothing else in the
//! workspace hardcodes them.

pub mod params;
pub mod registry;

pub use params::{ChainFamily, ChainParams, Network};
pub use registry::{ChainRegistry, ParamsError};
