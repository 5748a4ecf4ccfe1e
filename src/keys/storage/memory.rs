//! Key storage that never persists.
//!
//! Useful when the key comes from a user password or another secure
//! source that can re-supply it. Each instance owns its own key; two
//! instances over the same namespace share nothing.

use std::sync::RwLock;

use crate::crypto::SecretKey;

use super::{KeyStorage, KeyStorageType};

#[derive(Default)]
pub struct MemoryOnlyKeyStorage {
    key: RwLock<Option<SecretKey>>,
}

impl MemoryOnlyKeyStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyStorage for MemoryOnlyKeyStorage {
    fn load_key(&self) -> Option<SecretKey> {
        self.key.read().expect("key lock poisoned").clone()
    }

    fn save_key(&self, key: Option<&SecretKey>) -> bool {
        *self.key.write().expect("key lock poisoned") = key.cloned();
        true
    }

    fn clear_key(&self) {
        *self.key.write().expect("key lock poisoned") = None;
    }

    fn storage_type(&self) -> KeyStorageType {
        KeyStorageType::NotPersistent
    }
}
