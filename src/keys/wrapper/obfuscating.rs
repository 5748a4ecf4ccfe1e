//! Software-only key wrapping for hosts without a secure hardware
//! module.
//!
//! The protecting key is the SHA-256 digest of an application-embedded
//! preshared secret concatenated with a random salt generated on first
//! use and persisted per salt index. This yields a unique protecting
//! key per installation, but an attacker with the application binary
//! and the stored salt can reconstruct it, hence *obfuscating*, not
//! hardware-grade.

use std::sync::{Arc, Mutex};

use crate::crypto::{envelope, SecretKey, KEY_ALGORITHM_AES};
use crate::errors::Result;
use crate::keys::generator::digest_key;
use crate::keys::storage::KeyStorageType;
use crate::salt::{SaltBox, SaltGenerator};

use super::SecretKeyWrapper;

/// Salt length backing the protecting key.
const SALT_SIZE_BYTES: usize = 512;

pub struct ObfuscatingSecretKeyWrapper {
    salt_index: i32,
    preshared_secret: String,
    salt_generator: Arc<dyn SaltGenerator>,
    salts: SaltBox,
    wrapping_key: Mutex<Option<SecretKey>>,
}

impl ObfuscatingSecretKeyWrapper {
    pub fn new(
        salts: SaltBox,
        salt_index: i32,
        salt_generator: Arc<dyn SaltGenerator>,
        preshared_secret: impl Into<String>,
    ) -> Self {
        Self {
            salt_index,
            preshared_secret: preshared_secret.into(),
            salt_generator,
            salts,
            wrapping_key: Mutex::new(None),
        }
    }

    fn wrapping_key(&self) -> Result<SecretKey> {
        let mut cached = self.wrapping_key.lock().expect("wrapping key lock poisoned");
        if cached.is_none() {
            let salt = self.salt()?;
            let mut seed = Vec::with_capacity(self.preshared_secret.len() + salt.len());
            seed.extend_from_slice(self.preshared_secret.as_bytes());
            seed.extend_from_slice(&salt);
            *cached = Some(digest_key(&seed, KEY_ALGORITHM_AES));
        }
        Ok(cached.clone().expect("wrapping key populated above"))
    }

    fn salt(&self) -> Result<Vec<u8>> {
        if let Some(salt) = self.salts.stored_bits(self.salt_index, SALT_SIZE_BYTES) {
            return Ok(salt);
        }
        let salt = self.salt_generator.create_salt_bytes(SALT_SIZE_BYTES)?;
        self.salts
            .write_stored_bits(self.salt_index, Some(&salt), SALT_SIZE_BYTES);
        Ok(salt)
    }
}

impl SecretKeyWrapper for ObfuscatingSecretKeyWrapper {
    fn wrap(&self, key: &SecretKey) -> Result<Vec<u8>> {
        let wrapping_key = self.wrapping_key()?;
        envelope::encrypt(&wrapping_key, key.as_bytes())
    }

    fn unwrap(&self, blob: &[u8], algorithm: &str) -> Result<SecretKey> {
        let wrapping_key = self.wrapping_key()?;
        let bytes = envelope::decrypt(&wrapping_key, blob)?;
        Ok(SecretKey::new(algorithm, bytes))
    }

    fn clear_key(&self) -> Result<()> {
        *self.wrapping_key.lock().expect("wrapping key lock poisoned") = None;
        self.salts
            .write_stored_bits(self.salt_index, None, SALT_SIZE_BYTES);
        Ok(())
    }

    fn storage_type(&self) -> KeyStorageType {
        KeyStorageType::Obfuscated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::generator::Aes256RandomKeyFactory;
    use crate::salt::{PrngSaltGenerator, DEFAULT_SALT_NAMESPACE};
    use crate::store::{MemoryStoreProvider, StoreProvider};

    fn wrapper_over(provider: &MemoryStoreProvider) -> ObfuscatingSecretKeyWrapper {
        let salts = SaltBox::new(provider.open(DEFAULT_SALT_NAMESPACE).unwrap());
        ObfuscatingSecretKeyWrapper::new(
            salts,
            1,
            Arc::new(PrngSaltGenerator::new()),
            "app-embedded-secret",
        )
    }

    #[test]
    fn wrap_unwrap_roundtrip() {
        let provider = MemoryStoreProvider::new();
        let wrapper = wrapper_over(&provider);
        let key = Aes256RandomKeyFactory::create_key().unwrap();

        let blob = wrapper.wrap(&key).unwrap();
        assert_eq!(wrapper.unwrap(&blob, KEY_ALGORITHM_AES).unwrap(), key);
        assert_eq!(wrapper.storage_type(), KeyStorageType::Obfuscated);
    }

    #[test]
    fn salt_persists_across_wrapper_instances() {
        let provider = MemoryStoreProvider::new();
        let key = Aes256RandomKeyFactory::create_key().unwrap();

        let blob = wrapper_over(&provider).wrap(&key).unwrap();

        // A second wrapper over the same provider finds the same salt
        // and derives the same protecting key.
        let unwrapped = wrapper_over(&provider)
            .unwrap(&blob, KEY_ALGORITHM_AES)
            .unwrap();
        assert_eq!(unwrapped, key);
    }

    #[test]
    fn clear_key_discards_the_salt() {
        let provider = MemoryStoreProvider::new();
        let wrapper = wrapper_over(&provider);
        let key = Aes256RandomKeyFactory::create_key().unwrap();

        let blob = wrapper.wrap(&key).unwrap();
        wrapper.clear_key().unwrap();

        // Fresh salt, fresh protecting key: the old blob never yields
        // the original key again.
        match wrapper.unwrap(&blob, KEY_ALGORITHM_AES) {
            Ok(recovered) => assert_ne!(recovered, key),
            Err(e) => assert!(e.is_crypto_failure()),
        }
    }
}
