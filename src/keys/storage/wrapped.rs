//! Key storage persisting a wrapped key record in the backing store.
//!
//! The unwrapped key is cached in memory behind a double-checked
//! read/write lock: once populated, loads take only the shared read
//! lock; a miss takes the write lock, rechecks, and performs the
//! (possibly expensive) load-and-unwrap exactly once.

use std::sync::{Arc, RwLock};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use tracing::error;

use crate::crypto::SecretKey;
use crate::keys::wrapper::SecretKeyWrapper;
use crate::store::{KeyValueStore, StoreBatch};

use super::{KeyStorage, KeyStorageType};

/// Store key prefix for wrapped key records.
const PREF_ROOT: &str = "vaultedBlobV2.";

pub struct WrappedKeyStorage {
    wrapper: Box<dyn SecretKeyWrapper>,
    store: Arc<dyn KeyValueStore>,
    keystore_alias: String,
    cipher_algorithm: String,
    cached_key: RwLock<Option<SecretKey>>,
}

impl WrappedKeyStorage {
    pub fn new(
        wrapper: Box<dyn SecretKeyWrapper>,
        store: Arc<dyn KeyValueStore>,
        keystore_alias: impl Into<String>,
        cipher_algorithm: impl Into<String>,
    ) -> Self {
        Self {
            wrapper,
            store,
            keystore_alias: keystore_alias.into(),
            cipher_algorithm: cipher_algorithm.into(),
            cached_key: RwLock::new(None),
        }
    }

    fn record_key(&self) -> String {
        format!("{PREF_ROOT}{}", self.keystore_alias)
    }

    /// Read and unwrap the persisted record. Failures are logged and
    /// reported as "no key"; the caller re-provisions.
    fn load_secret_key(&self) -> Option<SecretKey> {
        let encoded = self.store.get(&self.record_key())?;
        let blob = match BASE64.decode(&encoded) {
            Ok(blob) => blob,
            Err(e) => {
                error!(alias = %self.keystore_alias, error = %e, "wrapped key record not base64");
                return None;
            }
        };
        match self.wrapper.unwrap(&blob, &self.cipher_algorithm) {
            Ok(key) => Some(key),
            Err(e) => {
                error!(alias = %self.keystore_alias, error = %e, "wrapped key load failed");
                None
            }
        }
    }

    /// Wrap and persist `key`; `None` removes the record. The write is
    /// committed synchronously: a lost key record is unrecoverable, so
    /// durability is not deferred. Returns success.
    fn store_secret_key(&self, key: Option<&SecretKey>) -> bool {
        let mut batch = StoreBatch::new();
        match key {
            None => {
                batch.remove(&self.record_key());
                self.store.commit(batch)
            }
            Some(key) => match self.wrapper.wrap(key) {
                Ok(blob) => {
                    batch.put(&self.record_key(), &BASE64.encode(blob));
                    self.store.commit(batch)
                }
                Err(e) => {
                    error!(alias = %self.keystore_alias, error = %e, "wrapped key save failed");
                    false
                }
            },
        }
    }
}

impl KeyStorage for WrappedKeyStorage {
    fn load_key(&self) -> Option<SecretKey> {
        // Fast path: populated cache behind the read lock.
        if let Some(key) = self
            .cached_key
            .read()
            .expect("key cache lock poisoned")
            .clone()
        {
            return Some(key);
        }

        // Miss: take the write lock so only one thread loads, and
        // recheck in case another thread won the race.
        let mut cached = self.cached_key.write().expect("key cache lock poisoned");
        if cached.is_none() {
            *cached = self.load_secret_key();
        }
        cached.clone()
    }

    fn save_key(&self, key: Option<&SecretKey>) -> bool {
        let mut cached = self.cached_key.write().expect("key cache lock poisoned");
        let success = self.store_secret_key(key);

        // Never leave a stale cache behind a failed save.
        *cached = if success { key.cloned() } else { None };
        success
    }

    fn clear_key(&self) {
        {
            let mut cached = self.cached_key.write().expect("key cache lock poisoned");
            *cached = None;
            self.store_secret_key(None);
        }
        if let Err(e) = self.wrapper.clear_key() {
            error!(alias = %self.keystore_alias, error = %e, "failed to clear key in wrapper");
        }
    }

    fn storage_type(&self) -> KeyStorageType {
        self.wrapper.storage_type()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::crypto::KEY_ALGORITHM_AES;
    use crate::errors::{Result, VaultError};
    use crate::hardware::SoftwareKeyStore;
    use crate::keys::generator::Aes256RandomKeyFactory;
    use crate::keys::wrapper::HardwareSecretKeyWrapper;
    use crate::store::{MemoryStoreProvider, StoreProvider};

    fn storage_over(provider: &MemoryStoreProvider) -> WrappedKeyStorage {
        let wrapper = HardwareSecretKeyWrapper::new(
            Arc::new(SoftwareKeyStore::with_key_bits(1024)),
            "storageAlias",
        );
        WrappedKeyStorage::new(
            Box::new(wrapper),
            provider.open("keyFile").unwrap(),
            "storageAlias",
            KEY_ALGORITHM_AES,
        )
    }

    #[test]
    fn save_then_load_roundtrip() {
        let provider = MemoryStoreProvider::new();
        let storage = storage_over(&provider);
        let key = Aes256RandomKeyFactory::create_key().unwrap();

        assert!(!storage.has_key());
        assert!(storage.save_key(Some(&key)));
        assert_eq!(storage.load_key().unwrap(), key);
        assert!(storage.has_key());
    }

    #[test]
    fn record_lands_under_the_alias_key() {
        let provider = MemoryStoreProvider::new();
        let storage = storage_over(&provider);
        let key = Aes256RandomKeyFactory::create_key().unwrap();
        storage.save_key(Some(&key));

        let store = provider.open("keyFile").unwrap();
        assert!(store.contains("vaultedBlobV2.storageAlias"));
    }

    #[test]
    fn clear_removes_record_and_cache() {
        let provider = MemoryStoreProvider::new();
        let storage = storage_over(&provider);
        let key = Aes256RandomKeyFactory::create_key().unwrap();
        storage.save_key(Some(&key));

        storage.clear_key();
        assert!(!storage.has_key());

        let store = provider.open("keyFile").unwrap();
        assert!(!store.contains("vaultedBlobV2.storageAlias"));
    }

    #[test]
    fn save_failure_invalidates_cache() {
        struct FailingWrapper;
        impl SecretKeyWrapper for FailingWrapper {
            fn wrap(&self, _key: &SecretKey) -> Result<Vec<u8>> {
                Err(VaultError::Crypto("wrap unavailable".into()))
            }
            fn unwrap(&self, _blob: &[u8], _algorithm: &str) -> Result<SecretKey> {
                Err(VaultError::Crypto("unwrap unavailable".into()))
            }
            fn clear_key(&self) -> Result<()> {
                Ok(())
            }
            fn storage_type(&self) -> KeyStorageType {
                KeyStorageType::Obfuscated
            }
        }

        let provider = MemoryStoreProvider::new();
        let storage = WrappedKeyStorage::new(
            Box::new(FailingWrapper),
            provider.open("keyFile").unwrap(),
            "failing",
            KEY_ALGORITHM_AES,
        );
        let key = Aes256RandomKeyFactory::create_key().unwrap();

        assert!(!storage.save_key(Some(&key)));
        assert!(!storage.has_key(), "cache must not survive a failed save");
    }

    #[test]
    fn second_storage_reads_the_same_record() {
        let provider = MemoryStoreProvider::new();
        let module = Arc::new(SoftwareKeyStore::with_key_bits(1024));
        let key = Aes256RandomKeyFactory::create_key().unwrap();

        let first = WrappedKeyStorage::new(
            Box::new(HardwareSecretKeyWrapper::new(
                Arc::clone(&module) as Arc<dyn crate::hardware::HardwareKeyStore>,
                "shared",
            )),
            provider.open("keyFile").unwrap(),
            "shared",
            KEY_ALGORITHM_AES,
        );
        first.save_key(Some(&key));

        let second = WrappedKeyStorage::new(
            Box::new(HardwareSecretKeyWrapper::new(
                Arc::clone(&module) as Arc<dyn crate::hardware::HardwareKeyStore>,
                "shared",
            )),
            provider.open("keyFile").unwrap(),
            "shared",
            KEY_ALGORITHM_AES,
        );
        assert_eq!(second.load_key().unwrap(), key);
    }
}
