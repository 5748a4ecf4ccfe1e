//! The untrusted persistent key-value store boundary.
//!
//! Everything the vault persists (encrypted values, wrapped key blobs,
//! capability markers, salt material) goes through these traits. The
//! store is assumed to provide durability but **no** confidentiality:
//! all sensitive bytes are encrypted before they reach it.
//!
//! Two implementations ship with the crate: [`FileStoreProvider`] (one
//! JSON file per namespace, atomic writes) and [`MemoryStoreProvider`]
//! (process-local, for tests and memory-only hosts).

mod file;
mod memory;

pub use file::FileStoreProvider;
pub use memory::MemoryStoreProvider;

use std::sync::Arc;

use crate::errors::Result;

/// A batch of mutations applied to a [`KeyValueStore`] as one edit.
///
/// Order of application: clear first, then removals, then puts.
#[derive(Debug, Default, Clone)]
pub struct StoreBatch {
    clear_all: bool,
    removes: Vec<String>,
    puts: Vec<(String, String)>,
}

impl StoreBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Erase every entry in the namespace before applying the rest of
    /// the batch.
    pub fn clear(&mut self) {
        self.clear_all = true;
    }

    pub fn remove(&mut self, key: &str) {
        self.removes.push(key.to_string());
    }

    pub fn put(&mut self, key: &str, value: &str) {
        self.puts.push((key.to_string(), value.to_string()));
    }

    pub fn is_clear_all(&self) -> bool {
        self.clear_all
    }

    pub fn removes(&self) -> &[String] {
        &self.removes
    }

    pub fn puts(&self) -> &[(String, String)] {
        &self.puts
    }
}

/// One named namespace inside the backing store.
///
/// Values are opaque strings. Reads observe every previously applied or
/// committed batch from any thread; `apply` makes the mutation visible
/// to readers immediately but persists it asynchronously, while `commit`
/// blocks until the mutation is durable and reports success.
pub trait KeyValueStore: Send + Sync {
    /// Read a single value.
    fn get(&self, key: &str) -> Option<String>;

    /// Metadata-only presence check.
    fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Every key currently present in the namespace.
    fn keys(&self) -> Vec<String>;

    /// Apply a batch fire-and-forget. The in-memory view is updated
    /// before this returns; durability is best-effort and asynchronous.
    fn apply(&self, batch: StoreBatch);

    /// Apply a batch and block until it is durable.
    fn commit(&self, batch: StoreBatch) -> bool;
}

/// Opens namespaces by name.
///
/// Providers cache open namespaces process-wide: two `open` calls with
/// the same name return handles onto the same underlying store, so a
/// value applied through one handle is visible through the other.
pub trait StoreProvider: Send + Sync {
    fn open(&self, name: &str) -> Result<Arc<dyn KeyValueStore>>;
}

/// Validate a namespace name before mapping it onto backing storage.
///
/// Allowed: ASCII letters, digits, underscores, hyphens, periods.
/// Must be non-empty and at most 256 characters.
pub(crate) fn validate_namespace_name(name: &str) -> Result<()> {
    use crate::errors::VaultError;

    if name.is_empty() {
        return Err(VaultError::Configuration(
            "store namespace name cannot be empty".into(),
        ));
    }
    if name.len() > 256 {
        return Err(VaultError::Configuration(
            "store namespace name cannot exceed 256 characters".into(),
        ));
    }
    if !name
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-' || b == b'.')
    {
        return Err(VaultError::Configuration(format!(
            "store namespace name '{name}' contains invalid characters"
        )));
    }
    Ok(())
}
