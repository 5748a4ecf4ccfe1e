//! Salt material: generation and persistence.
//!
//! Salts feed the obfuscating key wrapper and password-derived keys.
//! [`SaltBox`] keeps a disk-plus-memory cache of salt blobs keyed by an
//! integer index; the obfuscating wrapper asks for "the salt at index N"
//! and gets the same bytes back for the lifetime of the installation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::RngCore;
use tracing::warn;

use crate::errors::{Result, VaultError};
use crate::store::{KeyValueStore, StoreBatch};

/// Default store namespace holding salt records.
pub const DEFAULT_SALT_NAMESPACE: &str = "NaCl";

/// Produces byte sequences used as salt or raw key material.
pub trait SaltGenerator: Send + Sync {
    fn create_salt_bytes(&self, size: usize) -> Result<Vec<u8>>;
}

/// Cryptographically random salt from the OS CSPRNG.
#[derive(Default)]
pub struct PrngSaltGenerator;

impl PrngSaltGenerator {
    pub fn new() -> Self {
        Self
    }
}

impl SaltGenerator for PrngSaltGenerator {
    fn create_salt_bytes(&self, size: usize) -> Result<Vec<u8>> {
        let mut salt = vec![0u8; size];
        rand::rngs::OsRng.fill_bytes(&mut salt);
        Ok(salt)
    }
}

/// Provides a predefined salt. Primarily useful for feeding a
/// pre-calculated salt into password-based key derivation.
pub struct SpecificSaltGenerator {
    salt_bytes: Vec<u8>,
}

impl SpecificSaltGenerator {
    pub fn new(salt_bytes: Vec<u8>) -> Self {
        Self { salt_bytes }
    }
}

impl SaltGenerator for SpecificSaltGenerator {
    fn create_salt_bytes(&self, size: usize) -> Result<Vec<u8>> {
        if size > self.salt_bytes.len() {
            return Err(VaultError::Configuration(
                "requested salt size exceeds amount available".into(),
            ));
        }
        Ok(self.salt_bytes[..size].to_vec())
    }
}

/// Disk and in-memory cache of random salt, keyed by integer index.
///
/// Records are stored base64-encoded under `NaCl-<index>`. A cached or
/// stored blob whose length no longer matches the requested size is
/// treated as absent, so a size change regenerates rather than reuses.
pub struct SaltBox {
    store: Arc<dyn KeyValueStore>,
    cache: Mutex<HashMap<i32, Vec<u8>>>,
}

impl SaltBox {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn setting_name(salt_index: i32) -> String {
        format!("NaCl-{salt_index}")
    }

    fn is_invalid(bits: Option<&[u8]>, requested_size: usize) -> bool {
        match bits {
            Some(bits) => bits.len() != requested_size,
            None => true,
        }
    }

    /// Return the previously stored salt at `salt_index`, or `None` if
    /// nothing valid is stored.
    pub fn stored_bits(&self, salt_index: i32, requested_size: usize) -> Option<Vec<u8>> {
        let mut cache = self.cache.lock().expect("salt cache lock poisoned");

        let cached = cache.get(&salt_index).cloned();
        if !Self::is_invalid(cached.as_deref(), requested_size) {
            return cached;
        }

        // Cache miss or stale entry; consult the store.
        let loaded = self.load_from_store(salt_index, requested_size);
        match &loaded {
            Some(bits) => {
                cache.insert(salt_index, bits.clone());
            }
            None => {
                cache.remove(&salt_index);
            }
        }
        loaded
    }

    /// Write (or, with `None`, delete) the salt at `salt_index`.
    pub fn write_stored_bits(
        &self,
        salt_index: i32,
        stored_bits: Option<&[u8]>,
        requested_size: usize,
    ) {
        let mut batch = StoreBatch::new();
        if Self::is_invalid(stored_bits, requested_size) {
            batch.remove(&Self::setting_name(salt_index));
        } else if let Some(bits) = stored_bits {
            batch.put(&Self::setting_name(salt_index), &BASE64.encode(bits));
        }
        // Committed synchronously: a salt that never reaches disk makes
        // the wrapped key unrecoverable on the next start.
        if !self.store.commit(batch) {
            warn!(salt_index, "salt write failed to commit");
        }

        let mut cache = self.cache.lock().expect("salt cache lock poisoned");
        if Self::is_invalid(stored_bits, requested_size) {
            cache.remove(&salt_index);
        } else if let Some(bits) = stored_bits {
            cache.insert(salt_index, bits.to_vec());
        }
    }

    fn load_from_store(&self, salt_index: i32, requested_size: usize) -> Option<Vec<u8>> {
        let encoded = self.store.get(&Self::setting_name(salt_index))?;
        match BASE64.decode(&encoded) {
            Ok(bits) if bits.len() == requested_size => Some(bits),
            Ok(_) => None,
            Err(e) => {
                warn!(salt_index, error = %e, "stored salt was not properly encoded");
                None
            }
        }
    }
}
