//! Process-scoped vault registry.
//!
//! Ensures app-wide uniqueness of vault indices, key aliases, and
//! backing namespaces, and keeps vaults single-instance so a key change
//! or clear on one thread is seen by every holder. Populate once at
//! process start.
//!
//! Deliberately *not* a global singleton: construct one, share it
//! (e.g. in an `Arc`), and tests get isolated instances for free.
//! Indices need not be consecutive, but they must be unique across the
//! application and stable across upgrades.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use crate::errors::{Result, VaultError};
use crate::vault::StandardVault;

#[derive(Default)]
struct RegistryInner {
    vaults: HashMap<i32, Arc<StandardVault>>,
    pref_files: HashSet<String>,
    key_aliases: HashSet<String>,
}

#[derive(Default)]
pub struct VaultRegistry {
    inner: Mutex<RegistryInner>,
}

impl VaultRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a vault, enforcing that the index, namespace, and key
    /// alias are each unused. Fails with
    /// [`VaultError::Configuration`] on any collision; on success the
    /// insertion is atomic with the check.
    pub fn add_vault(
        &self,
        index: i32,
        pref_file: &str,
        key_alias: &str,
        vault: Arc<StandardVault>,
    ) -> Result<()> {
        let mut inner = self.inner.lock().expect("registry lock poisoned");

        if inner.pref_files.contains(pref_file) {
            return Err(VaultError::Configuration(
                "only one vault per application can use the same preference file".into(),
            ));
        }
        if inner.key_aliases.contains(key_alias) {
            return Err(VaultError::Configuration(
                "only one vault per application can use the same key alias".into(),
            ));
        }
        if inner.vaults.contains_key(&index) {
            return Err(VaultError::Configuration(
                "only one vault per application can use the same index".into(),
            ));
        }

        Self::insert(&mut inner, index, pref_file, key_alias, vault);
        Ok(())
    }

    /// Register without the uniqueness check, for intentional
    /// re-registration.
    pub fn replace_vault(
        &self,
        index: i32,
        pref_file: &str,
        key_alias: &str,
        vault: Arc<StandardVault>,
    ) {
        let mut inner = self.inner.lock().expect("registry lock poisoned");
        Self::insert(&mut inner, index, pref_file, key_alias, vault);
    }

    pub fn get_vault(&self, index: i32) -> Option<Arc<StandardVault>> {
        self.inner
            .lock()
            .expect("registry lock poisoned")
            .vaults
            .get(&index)
            .cloned()
    }

    /// Reset all three key sets. Intended for process bootstrap and
    /// test isolation only.
    pub fn clear(&self) {
        let mut inner = self.inner.lock().expect("registry lock poisoned");
        inner.vaults.clear();
        inner.pref_files.clear();
        inner.key_aliases.clear();
    }

    fn insert(
        inner: &mut RegistryInner,
        index: i32,
        pref_file: &str,
        key_alias: &str,
        vault: Arc<StandardVault>,
    ) {
        inner.pref_files.insert(pref_file.to_string());
        inner.key_aliases.insert(key_alias.to_string());
        inner.vaults.insert(index, vault);
    }
}
