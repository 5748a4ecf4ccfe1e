//! The standard vault implementation.
//!
//! Every value is serialized to a canonical string, encrypted through
//! the envelope with the key currently held by the [`KeyStorage`], and
//! stored as an opaque string in the backing namespace. Reads decrypt
//! on the fly; a missing key or a failed decrypt degrades to the caller
//! default unless strict mode (`enable_exceptions`) is on.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::warn;

use crate::crypto::{envelope, SecretKey};
use crate::errors::Result;
use crate::keys::storage::{KeyStorage, KeyStorageType};
use crate::store::{KeyValueStore, StoreBatch, StoreProvider};

use super::{VaultChangeListener, VaultEditor, VaultValue};

/// Separator token for string sets: long enough and random enough that
/// it will not appear in real data. Changing it breaks every stored
/// set, so it is frozen.
pub(crate) const STRING_SET_SEPARATOR: &str =
    "1eRHtJaybutdAsFp2DkfrT1FqMJlLfT7DdgCpQtTaoQWheoeFBZRqt5pgFDH7Cf";

pub struct StandardVault {
    stores: Arc<dyn StoreProvider>,
    key_storage: Arc<dyn KeyStorage>,
    pref_file: String,
    enable_exceptions: bool,
    /// Backing namespace handle, opened lazily and cached.
    store: Mutex<Option<Arc<dyn KeyValueStore>>>,
    listeners: Mutex<Vec<Arc<dyn VaultChangeListener>>>,
}

impl std::fmt::Debug for StandardVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StandardVault")
            .field("pref_file", &self.pref_file)
            .field("enable_exceptions", &self.enable_exceptions)
            .finish_non_exhaustive()
    }
}

impl StandardVault {
    pub fn new(
        stores: Arc<dyn StoreProvider>,
        key_storage: Arc<dyn KeyStorage>,
        pref_file: impl Into<String>,
        enable_exceptions: bool,
    ) -> Self {
        Self {
            stores,
            key_storage,
            pref_file: pref_file.into(),
            enable_exceptions,
            store: Mutex::new(None),
            listeners: Mutex::new(Vec::new()),
        }
    }

    // ------------------------------------------------------------------
    // Key management
    // ------------------------------------------------------------------

    /// Whether the vault currently holds a valid key to encrypt with.
    pub fn is_key_available(&self) -> bool {
        self.key_storage.has_key()
    }

    /// The security class of the underlying key storage.
    pub fn key_storage_type(&self) -> KeyStorageType {
        self.key_storage.storage_type()
    }

    /// Set the active key without touching stored data. Primarily for
    /// memory-only storage and post-clear re-provisioning; typical
    /// callers go through [`StandardVault::rekey_storage`]. Passing
    /// `None` removes the key.
    pub fn set_key(&self, secret_key: Option<SecretKey>) -> bool {
        self.key_storage.save_key(secret_key.as_ref())
    }

    /// Remove all stored values and destroy the keys associated with
    /// this vault.
    pub fn clear_storage(&self) -> Result<()> {
        let store = self.store()?;
        let mut batch = StoreBatch::new();
        batch.clear();
        store.apply(batch);
        self.key_storage.clear_key();
        Ok(())
    }

    /// Remove all stored values, then adopt `secret_key` for future
    /// data. Old values are destroyed first: they would be unreadable
    /// garbage under the new key, not data.
    pub fn rekey_storage(&self, secret_key: Option<SecretKey>) -> Result<bool> {
        self.clear_storage()?;
        Ok(self.set_key(secret_key))
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Metadata-only presence check; nothing is decrypted.
    pub fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.store()?.contains(key))
    }

    /// Read and decrypt a string value, or return `default` when the
    /// key is absent, the value is absent, or (non-strict mode only)
    /// decryption fails.
    pub fn get_string(&self, key: &str, default: Option<&str>) -> Result<Option<String>> {
        match self.read_decrypted(key) {
            Ok(Some(value)) => Ok(Some(value)),
            Ok(None) => Ok(default.map(str::to_string)),
            Err(e) if e.is_crypto_failure() && !self.enable_exceptions => {
                warn!(key, error = %e, "decrypt failed, returning default");
                Ok(default.map(str::to_string))
            }
            Err(e) => Err(e),
        }
    }

    pub fn get_boolean(&self, key: &str, default: bool) -> Result<bool> {
        let value = self.get_string(key, None)?;
        Ok(value.and_then(|v| v.parse().ok()).unwrap_or(default))
    }

    pub fn get_int(&self, key: &str, default: i32) -> Result<i32> {
        let value = self.get_string(key, None)?;
        Ok(value.and_then(|v| v.parse().ok()).unwrap_or(default))
    }

    pub fn get_long(&self, key: &str, default: i64) -> Result<i64> {
        let value = self.get_string(key, None)?;
        Ok(value.and_then(|v| v.parse().ok()).unwrap_or(default))
    }

    pub fn get_float(&self, key: &str, default: f32) -> Result<f32> {
        let value = self.get_string(key, None)?;
        Ok(value.and_then(|v| v.parse().ok()).unwrap_or(default))
    }

    /// Read a string set. Membership round-trips; element order is not
    /// guaranteed to be meaningful.
    pub fn get_string_set(
        &self,
        key: &str,
        default: Option<Vec<String>>,
    ) -> Result<Option<Vec<String>>> {
        let joined = self.get_string(key, None)?;
        Ok(match joined {
            Some(joined) => Some(split_string_set(&joined)),
            None => default,
        })
    }

    /// Decrypt every stored value and infer its type from the literal
    /// text (see [`VaultValue`] for the inference rules and their
    /// documented lossiness).
    ///
    /// In non-strict mode a value that fails to decrypt stops the
    /// enumeration and the entries decoded so far are returned.
    pub fn all(&self) -> Result<HashMap<String, VaultValue>> {
        let mut result = HashMap::new();

        let Some(secret_key) = self.key_storage.load_key() else {
            return Ok(result);
        };

        let store = self.store()?;
        for key in store.keys() {
            let Some(raw) = store.get(&key) else { continue };
            match envelope::decrypt_string(&secret_key, &raw) {
                Ok(value) => {
                    result.insert(key, infer_value(&value));
                }
                Err(e) if e.is_crypto_failure() => {
                    warn!(key, error = %e, "enumeration hit an undecryptable value");
                    if self.enable_exceptions {
                        return Err(e);
                    }
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        Ok(result)
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Start a batch edit.
    pub fn edit(&self) -> VaultEditor<'_> {
        VaultEditor::new(self)
    }

    /// Apply a batch: clear, removals, then encrypted puts. Returns
    /// `Ok(false)` when no key is available or (non-strict mode) when
    /// encryption or the commit fails.
    ///
    /// Listeners are notified once per affected key, after the write.
    pub(crate) fn write_values(
        &self,
        commit: bool,
        was_cleared: bool,
        removals: &[String],
        bundle: &HashMap<String, VaultValue>,
    ) -> Result<bool> {
        let store = self.store()?;

        let mut batch = StoreBatch::new();
        let mut affected_keys: Vec<String> = Vec::new();

        if was_cleared {
            batch.clear();
        }
        for key in removals {
            batch.remove(key);
            affected_keys.push(key.clone());
        }

        // The secret key stays in memory only long enough to use it.
        let Some(secret_key) = self.key_storage.load_key() else {
            warn!(pref_file = %self.pref_file, "write attempted with no key available");
            return Ok(false);
        };

        for (key, value) in bundle {
            let encrypted = match self.encrypt_value(&secret_key, value) {
                Ok(encrypted) => encrypted,
                Err(e) => {
                    warn!(key, error = %e, "value encryption failed");
                    if self.enable_exceptions {
                        return Err(e);
                    }
                    return Ok(false);
                }
            };
            batch.put(key, &encrypted);
            affected_keys.push(key.clone());
        }

        let success = if commit {
            store.commit(batch)
        } else {
            store.apply(batch);
            true
        };

        if success {
            self.notify_listeners(&affected_keys);
        }
        Ok(success)
    }

    // ------------------------------------------------------------------
    // Listeners
    // ------------------------------------------------------------------

    pub fn register_change_listener(&self, listener: Arc<dyn VaultChangeListener>) {
        self.listeners
            .lock()
            .expect("listener lock poisoned")
            .push(listener);
    }

    pub fn unregister_change_listener(&self, listener: &Arc<dyn VaultChangeListener>) {
        self.listeners
            .lock()
            .expect("listener lock poisoned")
            .retain(|registered| !Arc::ptr_eq(registered, listener));
    }

    fn notify_listeners(&self, affected_keys: &[String]) {
        let listeners = self.listeners.lock().expect("listener lock poisoned").clone();
        for listener in &listeners {
            for key in affected_keys {
                listener.on_vault_changed(key);
            }
        }
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn store(&self) -> Result<Arc<dyn KeyValueStore>> {
        let mut cached = self.store.lock().expect("store handle lock poisoned");
        if cached.is_none() {
            *cached = Some(self.stores.open(&self.pref_file)?);
        }
        Ok(Arc::clone(cached.as_ref().expect("store opened above")))
    }

    /// Decrypt the raw stored string under `key`. `Ok(None)` covers
    /// both "no such entry" and "no key available": the caller cannot
    /// decrypt either way.
    fn read_decrypted(&self, key: &str) -> Result<Option<String>> {
        let store = self.store()?;
        let Some(raw) = store.get(key) else {
            return Ok(None);
        };
        let Some(secret_key) = self.key_storage.load_key() else {
            return Ok(None);
        };
        envelope::decrypt_string(&secret_key, &raw).map(Some)
    }

    fn encrypt_value(&self, secret_key: &SecretKey, value: &VaultValue) -> Result<String> {
        envelope::encrypt_string(secret_key, &canonical_string(value))
    }
}

/// Serialize a typed value to the canonical stored text.
fn canonical_string(value: &VaultValue) -> String {
    match value {
        VaultValue::String(s) => s.clone(),
        VaultValue::Boolean(b) => b.to_string(),
        VaultValue::Int(i) => i.to_string(),
        VaultValue::Long(l) => l.to_string(),
        VaultValue::Float(f) => f.to_string(),
        VaultValue::StringSet(set) => set.join(STRING_SET_SEPARATOR),
    }
}

fn split_string_set(joined: &str) -> Vec<String> {
    joined
        .split(STRING_SET_SEPARATOR)
        .map(str::to_string)
        .collect()
}

/// Reconstruct a value's type from its decrypted text.
///
/// Order matters and is frozen: float (requires a decimal point), then
/// integer (i32 when it fits, else i64), then boolean, then string set,
/// then plain string.
fn infer_value(text: &str) -> VaultValue {
    if text.contains('.') {
        if let Ok(float_value) = text.parse::<f32>() {
            return VaultValue::Float(float_value);
        }
    }
    if let Ok(long_value) = text.parse::<i64>() {
        return match i32::try_from(long_value) {
            Ok(int_value) => VaultValue::Int(int_value),
            Err(_) => VaultValue::Long(long_value),
        };
    }
    if let Ok(bool_value) = text.parse::<bool>() {
        return VaultValue::Boolean(bool_value);
    }
    if text.contains(STRING_SET_SEPARATOR) {
        return VaultValue::StringSet(split_string_set(text));
    }
    VaultValue::String(text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    // -----------------------------------------------------------------
    // Type inference
    // -----------------------------------------------------------------

    #[test]
    fn inference_order_float_int_bool_set_string() {
        assert_eq!(infer_value("-2.3"), VaultValue::Float(-2.3));
        assert_eq!(infer_value("-230"), VaultValue::Int(-230));
        assert_eq!(
            infer_value(&i64::MAX.to_string()),
            VaultValue::Long(i64::MAX)
        );
        assert_eq!(infer_value("true"), VaultValue::Boolean(true));
        assert_eq!(
            infer_value(&format!("one{STRING_SET_SEPARATOR}two")),
            VaultValue::StringSet(vec!["one".into(), "two".into()])
        );
        assert_eq!(
            infer_value("just text"),
            VaultValue::String("just text".into())
        );
    }

    #[test]
    fn inference_is_lossy_by_design() {
        // A *string* "true" enumerates as a boolean; this ambiguity is
        // part of the stored format and must not be "fixed".
        assert_eq!(infer_value("true"), VaultValue::Boolean(true));
        // A float with no fractional digits serializes without a dot
        // and comes back as an integer.
        assert_eq!(
            infer_value(&canonical_string(&VaultValue::Float(2.0))),
            VaultValue::Int(2)
        );
    }

    #[test]
    fn int_range_boundaries() {
        assert_eq!(
            infer_value(&i32::MAX.to_string()),
            VaultValue::Int(i32::MAX)
        );
        assert_eq!(
            infer_value(&i32::MIN.to_string()),
            VaultValue::Int(i32::MIN)
        );
        assert_eq!(
            infer_value(&(i32::MAX as i64 + 1).to_string()),
            VaultValue::Long(i32::MAX as i64 + 1)
        );
        assert_eq!(
            infer_value(&(i32::MIN as i64 - 1).to_string()),
            VaultValue::Long(i32::MIN as i64 - 1)
        );
    }

    // -----------------------------------------------------------------
    // Canonical serialization
    // -----------------------------------------------------------------

    #[test]
    fn canonical_strings_are_parseable() {
        assert_eq!(canonical_string(&VaultValue::Boolean(true)), "true");
        assert_eq!(canonical_string(&VaultValue::Int(-230)), "-230");
        assert_eq!(canonical_string(&VaultValue::Float(-2.3)), "-2.3");
        assert_eq!(
            canonical_string(&VaultValue::Long(i64::MAX)),
            i64::MAX.to_string()
        );
    }

    #[test]
    fn string_set_roundtrip_through_separator() {
        let set = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let joined = canonical_string(&VaultValue::StringSet(set.clone()));
        assert_eq!(split_string_set(&joined), set);
    }

    #[test]
    fn single_element_set_is_indistinguishable_from_string() {
        let joined = canonical_string(&VaultValue::StringSet(vec!["only".to_string()]));
        assert_eq!(infer_value(&joined), VaultValue::String("only".into()));
        // GetStringSet still recovers it as a one-element set.
        assert_eq!(split_string_set(&joined), vec!["only".to_string()]);
    }
}
