//! Concurrent access: many readers against a freshly written value.

use std::sync::Arc;
use std::thread;

use prefvault::factory::{self, HostProfile, VaultConfig, VaultEnv};
use prefvault::hardware::SoftwareKeyStore;
use prefvault::keys::compat::{self, KeyStorageSpec, HARDWARE_KEYSTORE_LEVEL};
use prefvault::keys::generator::Aes256RandomKeyFactory;
use prefvault::keys::storage::KeyStorage;
use prefvault::salt::{PrngSaltGenerator, SaltGenerator};
use prefvault::store::MemoryStoreProvider;

const NUMBER_OF_SIMULTANEOUS_THREADS: usize = 60;
const NUMBER_OF_ITERATIONS: usize = 10;

fn test_env() -> VaultEnv {
    VaultEnv {
        stores: Arc::new(MemoryStoreProvider::new()),
        hardware: Arc::new(SoftwareKeyStore::with_key_bits(1024)),
        host: HostProfile::new(HARDWARE_KEYSTORE_LEVEL, "TestDevice"),
    }
}

// ---------------------------------------------------------------------------
// 60 readers x 10 rounds all observe the just-written value
// ---------------------------------------------------------------------------

#[test]
fn many_threads_observe_every_write() {
    let env = test_env();
    let cfg = VaultConfig {
        pref_file: "multiThreadPrefFile".into(),
        key_file: "multiThreadKeyFile".into(),
        key_alias: "multiThreadKeyAlias".into(),
        key_index: 1,
        preshared_secret: "a;sdl564546a6s6w2828d4fsdfbsijd;saj;9dj9".into(),
        enable_exceptions: false,
    };
    let vault = factory::app_keyed_compat_aes256_vault(&env, &cfg).expect("create vault");

    for iteration in 0..NUMBER_OF_ITERATIONS {
        let value = format!("testValue-{iteration}");
        vault.edit().put_string("testKey", &value).apply();

        thread::scope(|scope| {
            let handles: Vec<_> = (0..NUMBER_OF_SIMULTANEOUS_THREADS)
                .map(|_| {
                    let vault = Arc::clone(&vault);
                    let expected = value.clone();
                    scope.spawn(move || {
                        let read = vault
                            .get_string("testKey", None)
                            .expect("read must not fail")
                            .expect("value must be present");
                        assert_eq!(read, expected);
                    })
                })
                .collect();

            for handle in handles {
                handle.join().expect("reader thread panicked");
            }
        });
    }
}

// ---------------------------------------------------------------------------
// Concurrent cold loads unwrap the key exactly once and agree
// ---------------------------------------------------------------------------

#[test]
fn concurrent_first_loads_serialize_and_agree() {
    let env = test_env();
    let salt_generator: Arc<dyn SaltGenerator> = Arc::new(PrngSaltGenerator::new());
    let spec = KeyStorageSpec {
        key_file: "coldLoadKeyFile",
        keystore_alias: "coldLoadAlias",
        salt_index: 2,
        cipher_algorithm: "AES",
        preshared_secret: "0982141kjh4lk1j24;1l2k4j12;l4kj",
    };

    // Seed a persisted key through one storage instance.
    let seeded = compat::create_key_storage(
        &env,
        HARDWARE_KEYSTORE_LEVEL,
        &spec,
        &salt_generator,
    )
    .unwrap();
    let key = Aes256RandomKeyFactory::create_key().unwrap();
    assert!(seeded.save_key(Some(&key)));

    // A second instance starts with a cold cache; hammer it from many
    // threads at once.
    let cold: Arc<dyn KeyStorage> = compat::create_key_storage(
        &env,
        HARDWARE_KEYSTORE_LEVEL,
        &spec,
        &salt_generator,
    )
    .unwrap();

    thread::scope(|scope| {
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let cold = Arc::clone(&cold);
                let expected = key.clone();
                scope.spawn(move || {
                    let loaded = cold.load_key().expect("key must load");
                    assert_eq!(loaded, expected);
                })
            })
            .collect();

        for handle in handles {
            handle.join().expect("loader thread panicked");
        }
    });
}
