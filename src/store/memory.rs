//! Process-local store backend.
//!
//! Used by tests and by hosts that keep everything in memory. `apply`
//! and `commit` are equivalent here: there is no disk to defer to.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use crate::errors::Result;

use super::{validate_namespace_name, KeyValueStore, StoreBatch, StoreProvider};

/// In-memory implementation of one namespace.
pub(crate) struct MemoryStore {
    map: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub(crate) fn new() -> Self {
        Self {
            map: RwLock::new(HashMap::new()),
        }
    }

    fn apply_batch(&self, batch: &StoreBatch) {
        let mut map = self.map.write().expect("store lock poisoned");
        if batch.is_clear_all() {
            map.clear();
        }
        for key in batch.removes() {
            map.remove(key);
        }
        for (key, value) in batch.puts() {
            map.insert(key.clone(), value.clone());
        }
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.map.read().expect("store lock poisoned").get(key).cloned()
    }

    fn keys(&self) -> Vec<String> {
        self.map
            .read()
            .expect("store lock poisoned")
            .keys()
            .cloned()
            .collect()
    }

    fn apply(&self, batch: StoreBatch) {
        self.apply_batch(&batch);
    }

    fn commit(&self, batch: StoreBatch) -> bool {
        self.apply_batch(&batch);
        true
    }
}

/// Provider handing out process-cached [`MemoryStore`] namespaces.
#[derive(Default)]
pub struct MemoryStoreProvider {
    namespaces: Mutex<HashMap<String, Arc<MemoryStore>>>,
}

impl MemoryStoreProvider {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StoreProvider for MemoryStoreProvider {
    fn open(&self, name: &str) -> Result<Arc<dyn KeyValueStore>> {
        validate_namespace_name(name)?;
        let mut namespaces = self.namespaces.lock().expect("provider lock poisoned");
        let store = namespaces
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(MemoryStore::new()));
        Ok(Arc::clone(store) as Arc<dyn KeyValueStore>)
    }
}
