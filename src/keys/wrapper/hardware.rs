//! Hardware-backed key wrapping.
//!
//! Wraps symmetric keys using a public/private key pair held in the
//! secure hardware module, so the protecting key enjoys whatever
//! hardware guarantees the platform offers. See
//! <https://en.wikipedia.org/wiki/Key_wrap> for background.

use std::sync::{Arc, Mutex};

use rsa::Pkcs1v15Encrypt;

use crate::crypto::SecretKey;
use crate::errors::{Result, VaultError};
use crate::hardware::{HardwareKeyStore, KeyPair, KeyPairSpec};
use crate::keys::storage::KeyStorageType;

use super::SecretKeyWrapper;

/// Wrapper using the key pair stored under `alias` in the module. If no
/// pair exists it is generated on first use.
pub struct HardwareSecretKeyWrapper {
    alias: String,
    module: Arc<dyn HardwareKeyStore>,
    key_pair: Mutex<Option<KeyPair>>,
}

impl HardwareSecretKeyWrapper {
    pub fn new(module: Arc<dyn HardwareKeyStore>, alias: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            module,
            key_pair: Mutex::new(None),
        }
    }

    /// Capability probe: true when a usable pair can be produced.
    pub fn test_key(&self) -> Result<bool> {
        Ok(self.key_pair().is_ok())
    }

    fn key_pair(&self) -> Result<KeyPair> {
        let mut cached = self.key_pair.lock().expect("key pair lock poisoned");
        if cached.is_none() {
            if !self.module.contains_alias(&self.alias)? {
                self.module
                    .generate_key_pair(&self.alias, &KeyPairSpec::for_alias(&self.alias))?;
            }

            // Even if we just generated the pair, always read it back to
            // ensure we can read it successfully.
            let pair = self.module.key_pair(&self.alias)?.ok_or_else(|| {
                VaultError::Crypto(format!(
                    "key pair for alias '{}' unreadable after generation",
                    self.alias
                ))
            })?;
            *cached = Some(pair);
        }

        Ok(cached.clone().expect("pair populated above"))
    }
}

impl SecretKeyWrapper for HardwareSecretKeyWrapper {
    fn wrap(&self, key: &SecretKey) -> Result<Vec<u8>> {
        let pair = self.key_pair()?;
        pair.public
            .encrypt(&mut rand::rngs::OsRng, Pkcs1v15Encrypt, key.as_bytes())
            .map_err(|e| VaultError::Crypto(format!("RSA wrap failed: {e}")))
    }

    fn unwrap(&self, blob: &[u8], algorithm: &str) -> Result<SecretKey> {
        let pair = self.key_pair()?;
        let bytes = pair
            .private
            .decrypt(Pkcs1v15Encrypt, blob)
            .map_err(|e| VaultError::Crypto(format!("RSA unwrap failed: {e}")))?;
        Ok(SecretKey::new(algorithm, bytes))
    }

    fn clear_key(&self) -> Result<()> {
        *self.key_pair.lock().expect("key pair lock poisoned") = None;
        self.module.delete_entry(&self.alias)
    }

    fn storage_type(&self) -> KeyStorageType {
        KeyStorageType::HardwareBacked
    }
}
