//! Capability-aware key storage creation and upgrade.
//!
//! Picks the strongest [`KeyStorage`] variant the host supports and,
//! when the host capability level crosses the hardware-keystore
//! threshold, migrates the existing key from the weaker variant. The
//! level last used is persisted per alias so the upgrade runs at most
//! once per threshold crossing; a failed upgrade is absorbed and the
//! caller gets fresh storage with no key (prior data becomes
//! unreachable by design; callers detect this via `has_key` and
//! re-provision).

use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::errors::{Result, VaultError};
use crate::factory::VaultEnv;
use crate::keys::storage::{KeyStorage, WrappedKeyStorage};
use crate::keys::wrapper::{
    HardwareSecretKeyWrapper, ObfuscatingSecretKeyWrapper, SecretKeyWrapper,
};
use crate::salt::{SaltBox, SaltGenerator, DEFAULT_SALT_NAMESPACE};
use crate::store::{KeyValueStore, StoreBatch};

/// Host capability level at which the secure hardware module becomes
/// available.
pub const HARDWARE_KEYSTORE_LEVEL: u32 = 18;

/// Store key prefix recording the capability level last used per alias.
const PREF_LEVEL_ROOT: &str = "compatFactorySdkInt.";

/// Store key prefix caching the keystore probe result per alias.
const PREF_TEST_STATE_ROOT: &str = "androidKeystoreTestState.";

/// Hardware models whose secure module is known to be defective.
const BAD_HARDWARE_MODELS: &[&str] = &[
    "SGH-T889", // Galaxy Note 2 nukes its hardware keystore on PIN unlock.
];

/// True when `model` must never use hardware-backed storage.
pub fn is_bad_hardware(model: &str) -> bool {
    BAD_HARDWARE_MODELS.contains(&model)
}

/// Cached result of probing whether hardware-backed storage works here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeystoreTestState {
    Untested,
    Pass,
    Fail,
}

impl KeystoreTestState {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeystoreTestState::Untested => "Untested",
            KeystoreTestState::Pass => "Pass",
            KeystoreTestState::Fail => "Fail",
        }
    }

    /// Unknown values fall back to `Untested` so the probe re-runs.
    pub fn parse(value: &str) -> Self {
        match value {
            "Pass" => KeystoreTestState::Pass,
            "Fail" => KeystoreTestState::Fail,
            _ => KeystoreTestState::Untested,
        }
    }
}

/// Everything that identifies one key storage instance.
#[derive(Debug, Clone)]
pub struct KeyStorageSpec<'a> {
    /// Store namespace holding the wrapped key record and markers.
    pub key_file: &'a str,
    /// Alias under which the key (and any hardware pair) is stored.
    pub keystore_alias: &'a str,
    /// Salt index for the obfuscating fallback.
    pub salt_index: i32,
    /// Algorithm identifier recorded on unwrapped keys.
    pub cipher_algorithm: &'a str,
    /// Application-embedded secret for the obfuscating fallback.
    pub preshared_secret: &'a str,
}

/// Create or upgrade the best key storage for `current_level`.
pub fn create_key_storage(
    env: &VaultEnv,
    current_level: u32,
    spec: &KeyStorageSpec<'_>,
    salt_generator: &Arc<dyn SaltGenerator>,
) -> Result<Arc<dyn KeyStorage>> {
    let store = env.stores.open(spec.key_file)?;
    let old_level = read_old_level(store.as_ref(), spec.keystore_alias);

    // Check whether we crossed an upgrade boundary and migrate if so.
    let mut result = None;
    if requires_key_upgrade(old_level, current_level, &env.host.hardware_model) {
        result = match upgrade_key_storage(
            env,
            &store,
            old_level,
            current_level,
            spec,
            salt_generator,
        ) {
            Ok(upgraded) => upgraded,
            Err(e) => {
                error!(alias = spec.keystore_alias, error = %e, "key storage upgrade abandoned");
                None
            }
        };
    }

    // Upgrade failed or was unnecessary; fall through to the latest
    // appropriate variant at the current level.
    let storage = match result {
        Some(storage) => storage,
        None => create_version_appropriate_key_storage(
            env,
            &store,
            current_level,
            spec,
            salt_generator,
        )?,
    };

    write_current_level(store.as_ref(), current_level, spec.keystore_alias);
    Ok(storage)
}

/// Migrate the key from `old_level` storage into `current_level`
/// storage. `Ok(None)` means there was nothing to migrate or the save
/// into the new storage failed.
fn upgrade_key_storage(
    env: &VaultEnv,
    store: &Arc<dyn KeyValueStore>,
    old_level: u32,
    current_level: u32,
    spec: &KeyStorageSpec<'_>,
    salt_generator: &Arc<dyn SaltGenerator>,
) -> Result<Option<Arc<dyn KeyStorage>>> {
    let old_storage =
        create_version_appropriate_key_storage(env, store, old_level, spec, salt_generator)
            .map_err(|e| VaultError::Upgrade(format!("old storage unavailable: {e}")))?;

    let Some(secret_key) = old_storage.load_key() else {
        debug!(alias = spec.keystore_alias, "no key present, nothing to migrate");
        return Ok(None);
    };

    let new_storage =
        create_version_appropriate_key_storage(env, store, current_level, spec, salt_generator)
            .map_err(|e| VaultError::Upgrade(format!("new storage unavailable: {e}")))?;

    if new_storage.save_key(Some(&secret_key)) {
        debug!(alias = spec.keystore_alias, old_level, current_level, "key migrated");
        Ok(Some(new_storage))
    } else {
        Ok(None)
    }
}

/// Pick the wrapper variant appropriate for `level` and wrap it in a
/// [`WrappedKeyStorage`].
fn create_version_appropriate_key_storage(
    env: &VaultEnv,
    store: &Arc<dyn KeyValueStore>,
    level: u32,
    spec: &KeyStorageSpec<'_>,
    salt_generator: &Arc<dyn SaltGenerator>,
) -> Result<Arc<dyn KeyStorage>> {
    let wrapper: Box<dyn SecretKeyWrapper> = if level >= HARDWARE_KEYSTORE_LEVEL
        && !is_bad_hardware(&env.host.hardware_model)
        && can_use_hardware_keystore(env, store, spec.keystore_alias, level)
    {
        Box::new(HardwareSecretKeyWrapper::new(
            Arc::clone(&env.hardware),
            spec.keystore_alias,
        ))
    } else {
        let salts = SaltBox::new(env.stores.open(DEFAULT_SALT_NAMESPACE)?);
        Box::new(ObfuscatingSecretKeyWrapper::new(
            salts,
            spec.salt_index,
            Arc::clone(salt_generator),
            spec.preshared_secret,
        ))
    };

    Ok(Arc::new(WrappedKeyStorage::new(
        wrapper,
        Arc::clone(store),
        spec.keystore_alias,
        spec.cipher_algorithm,
    )))
}

/// Consult (and on first need, populate) the cached probe result.
fn can_use_hardware_keystore(
    env: &VaultEnv,
    store: &Arc<dyn KeyValueStore>,
    alias: &str,
    level: u32,
) -> bool {
    let mut state = read_keystore_test_state(store.as_ref(), alias);
    if state == KeystoreTestState::Untested {
        state = perform_keystore_test(env, alias, level);
        write_keystore_test_state(store.as_ref(), alias, state);
    }
    state == KeystoreTestState::Pass
}

/// Probe the hardware module by constructing a wrapper and verifying it
/// can produce a usable key pair.
fn perform_keystore_test(env: &VaultEnv, alias: &str, level: u32) -> KeystoreTestState {
    if level >= HARDWARE_KEYSTORE_LEVEL {
        let wrapper = HardwareSecretKeyWrapper::new(Arc::clone(&env.hardware), alias);
        match wrapper.test_key() {
            Ok(true) => return KeystoreTestState::Pass,
            Ok(false) => {}
            Err(e) => {
                error!(alias, error = %e, "hardware keystore probe errored");
            }
        }
    }

    warn!(alias, "this host failed the hardware keystore test");
    KeystoreTestState::Fail
}

/// Whether the host just crossed the hardware-keystore threshold.
fn requires_key_upgrade(old_level: u32, current_level: u32, model: &str) -> bool {
    old_level > 0
        && old_level < current_level
        && old_level < HARDWARE_KEYSTORE_LEVEL
        && current_level >= HARDWARE_KEYSTORE_LEVEL
        && !is_bad_hardware(model)
}

fn level_key(alias: &str) -> String {
    format!("{PREF_LEVEL_ROOT}{alias}")
}

fn read_old_level(store: &dyn KeyValueStore, alias: &str) -> u32 {
    store
        .get(&level_key(alias))
        .and_then(|value| value.parse().ok())
        .unwrap_or(0)
}

fn write_current_level(store: &dyn KeyValueStore, level: u32, alias: &str) {
    let mut batch = StoreBatch::new();
    batch.put(&level_key(alias), &level.to_string());
    store.apply(batch);
}

fn test_state_key(alias: &str) -> String {
    format!("{PREF_TEST_STATE_ROOT}{alias}")
}

fn read_keystore_test_state(store: &dyn KeyValueStore, alias: &str) -> KeystoreTestState {
    store
        .get(&test_state_key(alias))
        .map(|value| KeystoreTestState::parse(&value))
        .unwrap_or(KeystoreTestState::Untested)
}

fn write_keystore_test_state(store: &dyn KeyValueStore, alias: &str, state: KeystoreTestState) {
    let mut batch = StoreBatch::new();
    batch.put(&test_state_key(alias), state.as_str());
    store.apply(batch);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upgrade_boundary_detection() {
        let model = "Pixel 9";
        // No recorded level: no upgrade.
        assert!(!requires_key_upgrade(0, 18, model));
        // Recorded below threshold, current at threshold: upgrade.
        assert!(requires_key_upgrade(16, 18, model));
        assert!(requires_key_upgrade(17, 25, model));
        // Already at/above threshold: no upgrade.
        assert!(!requires_key_upgrade(18, 25, model));
        // Downgrade: no upgrade.
        assert!(!requires_key_upgrade(18, 16, model));
        // Both below threshold: no upgrade.
        assert!(!requires_key_upgrade(15, 16, model));
        // Denylisted hardware never upgrades.
        assert!(!requires_key_upgrade(16, 18, "SGH-T889"));
    }

    #[test]
    fn test_state_parse_roundtrip() {
        for state in [
            KeystoreTestState::Untested,
            KeystoreTestState::Pass,
            KeystoreTestState::Fail,
        ] {
            assert_eq!(KeystoreTestState::parse(state.as_str()), state);
        }
        assert_eq!(
            KeystoreTestState::parse("garbage"),
            KeystoreTestState::Untested
        );
    }

    #[test]
    fn denylist_matches_exact_model() {
        assert!(is_bad_hardware("SGH-T889"));
        assert!(!is_bad_hardware("SGH-T8890"));
    }
}
