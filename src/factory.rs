//! Vault construction.
//!
//! A [`VaultEnv`] bundles the host facilities (store provider, secure
//! hardware module, host profile); a [`VaultConfig`] names one vault.
//! The factory functions resolve key storage through the compat layer
//! and hand back ready-to-use vaults.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::crypto::KEY_ALGORITHM_AES;
use crate::errors::{Result, VaultError};
use crate::hardware::HardwareKeyStore;
use crate::keys::compat::{self, KeyStorageSpec};
use crate::keys::generator::Aes256RandomKeyFactory;
use crate::keys::storage::MemoryOnlyKeyStorage;
use crate::salt::{PrngSaltGenerator, SaltGenerator};
use crate::store::StoreProvider;
use crate::vault::StandardVault;

/// What the host looks like, for capability selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostProfile {
    /// Capability level; hardware-backed storage requires
    /// [`compat::HARDWARE_KEYSTORE_LEVEL`] or above.
    pub capability_level: u32,
    /// Hardware model string, checked against the defect denylist.
    pub hardware_model: String,
}

impl HostProfile {
    pub fn new(capability_level: u32, hardware_model: impl Into<String>) -> Self {
        Self {
            capability_level,
            hardware_model: hardware_model.into(),
        }
    }
}

/// The host facilities every vault is built from.
pub struct VaultEnv {
    pub stores: Arc<dyn StoreProvider>,
    pub hardware: Arc<dyn HardwareKeyStore>,
    pub host: HostProfile,
}

/// Static configuration naming one vault.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultConfig {
    /// Namespace holding the encrypted values.
    pub pref_file: String,
    /// Namespace holding the wrapped key and capability markers. Must
    /// differ from `pref_file`.
    pub key_file: String,
    /// Alias for the wrapped key record and any hardware key pair.
    pub key_alias: String,
    /// Unique index; doubles as the obfuscating wrapper's salt index.
    pub key_index: i32,
    /// Application-embedded secret for the obfuscating fallback.
    pub preshared_secret: String,
    /// Strict mode: propagate crypto failures instead of degrading to
    /// defaults.
    #[serde(default)]
    pub enable_exceptions: bool,
}

/// Create an unkeyed compat vault.
///
/// Use this when the key will be set later from a user password or
/// another specific key strategy; the vault is unusable until a key is
/// provided via [`StandardVault::rekey_storage`]. Check
/// [`StandardVault::is_key_available`] first; storage that was keyed
/// on a previous run loads its key transparently.
///
/// Hosts below the hardware threshold store the key obfuscated; at or
/// above it, the secure hardware module wraps the key, and a host
/// upgraded across the threshold has its key migrated automatically.
pub fn compat_aes256_vault(env: &VaultEnv, cfg: &VaultConfig) -> Result<Arc<StandardVault>> {
    if cfg.pref_file == cfg.key_file {
        return Err(VaultError::Configuration(
            "preference file and key file cannot be the same file".into(),
        ));
    }

    let salt_generator: Arc<dyn SaltGenerator> = Arc::new(PrngSaltGenerator::new());
    let key_storage = compat::create_key_storage(
        env,
        env.host.capability_level,
        &KeyStorageSpec {
            key_file: &cfg.key_file,
            keystore_alias: &cfg.key_alias,
            salt_index: cfg.key_index,
            cipher_algorithm: KEY_ALGORITHM_AES,
            preshared_secret: &cfg.preshared_secret,
        },
        &salt_generator,
    )?;

    Ok(Arc::new(StandardVault::new(
        Arc::clone(&env.stores),
        key_storage,
        &cfg.pref_file,
        cfg.enable_exceptions,
    )))
}

/// Create an application-keyed compat vault: as
/// [`compat_aes256_vault`], but a fresh random AES-256 key is generated
/// and stored on first use. Use this when there is no user secret to
/// derive a key from (API client tokens, sensitive app configuration).
pub fn app_keyed_compat_aes256_vault(
    env: &VaultEnv,
    cfg: &VaultConfig,
) -> Result<Arc<StandardVault>> {
    let vault = compat_aes256_vault(env, cfg)?;
    if !vault.is_key_available() {
        vault.rekey_storage(Some(Aes256RandomKeyFactory::create_key()?))?;
    }
    Ok(vault)
}

/// Create a vault whose key lives in memory only.
///
/// The key is never persisted; set it with [`StandardVault::set_key`]
/// and check [`StandardVault::is_key_available`] before reading or
/// writing.
pub fn memory_only_vault(
    env: &VaultEnv,
    pref_file: &str,
    enable_exceptions: bool,
) -> Result<Arc<StandardVault>> {
    Ok(Arc::new(StandardVault::new(
        Arc::clone(&env.stores),
        Arc::new(MemoryOnlyKeyStorage::new()),
        pref_file,
        enable_exceptions,
    )))
}
