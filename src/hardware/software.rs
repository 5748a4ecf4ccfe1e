//! In-process key pair module.
//!
//! Keeps generated RSA pairs in memory for the life of the process. Not
//! hardware-backed; it exists so the hardware-backed code path can run
//! on hosts (and in tests) without a secure module.

use std::collections::HashMap;
use std::sync::Mutex;

use rsa::{RsaPrivateKey, RsaPublicKey};
use tracing::debug;

use crate::errors::{Result, VaultError};

use super::{HardwareKeyStore, KeyPair, KeyPairSpec};

/// Default RSA modulus size in bits.
const DEFAULT_KEY_BITS: usize = 2048;

pub struct SoftwareKeyStore {
    key_bits: usize,
    pairs: Mutex<HashMap<String, KeyPair>>,
}

impl SoftwareKeyStore {
    pub fn new() -> Self {
        Self::with_key_bits(DEFAULT_KEY_BITS)
    }

    /// Override the RSA modulus size. Tests use small moduli to keep
    /// key generation fast; wrapped payloads are 32-byte AES keys, well
    /// under even a 512-bit modulus' PKCS#1 v1.5 capacity.
    pub fn with_key_bits(key_bits: usize) -> Self {
        Self {
            key_bits,
            pairs: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for SoftwareKeyStore {
    fn default() -> Self {
        Self::new()
    }
}

impl HardwareKeyStore for SoftwareKeyStore {
    fn contains_alias(&self, alias: &str) -> Result<bool> {
        Ok(self.pairs.lock().expect("pair lock poisoned").contains_key(alias))
    }

    fn generate_key_pair(&self, alias: &str, spec: &KeyPairSpec) -> Result<()> {
        // Holding the lock across generation serializes concurrent
        // first-use: the second caller finds the entry and returns.
        let mut pairs = self.pairs.lock().expect("pair lock poisoned");
        if pairs.contains_key(alias) {
            return Ok(());
        }

        debug!(alias, subject = %spec.subject, "generating key pair");
        let private = RsaPrivateKey::new(&mut rand::rngs::OsRng, self.key_bits)
            .map_err(|e| VaultError::Crypto(format!("RSA key generation failed: {e}")))?;
        let public = RsaPublicKey::from(&private);
        pairs.insert(alias.to_string(), KeyPair { public, private });
        Ok(())
    }

    fn key_pair(&self, alias: &str) -> Result<Option<KeyPair>> {
        Ok(self.pairs.lock().expect("pair lock poisoned").get(alias).cloned())
    }

    fn delete_entry(&self, alias: &str) -> Result<()> {
        self.pairs.lock().expect("pair lock poisoned").remove(alias);
        Ok(())
    }
}
