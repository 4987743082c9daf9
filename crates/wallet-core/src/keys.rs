//! BIP-32 key derivation over the generic wallet path layout.
//!
//! Every chain derives under m/purpose'/coin_type'/account'/change/index,
//! with purpose and coin type taken from the chain's registered parameters.

use std::collections::HashMap;
use std::sync::Mutex;

use bip32::{DerivationPath, XPrv};
use k256::ecdsa::SigningKey;
use zeroize::Zeroize;

use crate::error::WalletError;
use crate::mnemonic::{mnemonic_to_seed, Seed};

/// Location of one key under the wallet's derivation layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyPath {
    pub purpose: u32,
    pub coin_type: u32,
    pub account: u32,
    /// 0 external, 1 internal.
    pub change: u32,
    pub index: u32,
}

impl KeyPath {
    pub fn to_string_path(self) -> String {
        format!(
            "m/{}'/{}'/{}'/{}/{}",
            self.purpose, self.coin_type, self.account, self.change, self.index
        )
    }
}

/// A derived secp256k1 key. The secret is wiped on drop.
#[derive(Clone)]
pub struct DerivedKey {
    pub private_key: [u8; 32],
    pub public_key_compressed: [u8; 33],
    pub derivation_path: String,
}

impl Drop for DerivedKey {
    fn drop(&mut self) {
        self.private_key.zeroize();
    }
}

impl std::fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print the secret.
        f.debug_struct("DerivedKey")
            .field("derivation_path", &self.derivation_path)
            .finish_non_exhaustive()
    }
}

/// Anything that can produce keys at wallet path coordinates.
///
/// The transaction facade and the sync service only see this trait, so
/// tests can substitute a fixture source and hardware-backed sources can
/// slot in later.
pub trait KeySource: Send + Sync {
    fn key_at(&self, path: KeyPath) -> Result<DerivedKey, WalletError>;
}

/// Derive one secp256k1 key from a seed at the given path.
pub fn derive_key(seed: &[u8], path: KeyPath) -> Result<DerivedKey, WalletError> {
    let path_str = path.to_string_path();
    let parsed: DerivationPath = path_str
        .parse()
        .map_err(|e: bip32::Error| WalletError::DerivationFailed(e.to_string()))?;

    let xprv = XPrv::derive_from_path(seed, &parsed)
        .map_err(|e| WalletError::DerivationFailed(e.to_string()))?;

    let private_key: [u8; 32] = xprv.to_bytes().into();
    let signing_key = SigningKey::from_bytes(&private_key.into())
        .map_err(|e| WalletError::DerivationFailed(e.to_string()))?;
    let public_key_compressed: [u8; 33] = signing_key
        .verifying_key()
        .to_sec1_bytes()
        .as_ref()
        .try_into()
        .map_err(|_| WalletError::DerivationFailed("bad public key length".into()))?;

    Ok(DerivedKey {
        private_key,
        public_key_compressed,
        derivation_path: path_str,
    })
}

/// Seed-backed key source with a per-path cache.
///
/// BIP-32 hardened derivation is not cheap; a gap-limit scan touches the
/// same account branch dozens of times, so derived keys are memoized.
pub struct HdKeySource {
    seed: Seed,
    cache: Mutex<HashMap<KeyPath, DerivedKey>>,
}

impl HdKeySource {
    pub fn from_seed(seed: Seed) -> Self {
        Self {
            seed,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_mnemonic(phrase: &str, passphrase: &str) -> Result<Self, WalletError> {
        Ok(Self::from_seed(mnemonic_to_seed(phrase, passphrase)?))
    }
}

impl KeySource for HdKeySource {
    fn key_at(&self, path: KeyPath) -> Result<DerivedKey, WalletError> {
        let mut cache = self
            .cache
            .lock()
            .map_err(|_| WalletError::DerivationFailed("key cache poisoned".into()))?;
        if let Some(key) = cache.get(&path) {
            return Ok(key.clone());
        }
        let key = derive_key(self.seed.as_bytes(), path)?;
        cache.insert(path, key.clone());
        Ok(key)
    }
}
