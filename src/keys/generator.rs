//! Secret key generation: random keys, password-derived keys (Argon2id),
//! and digest-derived keys.

use std::sync::Arc;

use argon2::{Algorithm, Argon2, Params, Version};
use sha2::{Digest, Sha256};
use zeroize::Zeroize;

use crate::crypto::{SecretKey, AES256_KEY_LENGTH_BITS, KEY_ALGORITHM_AES};
use crate::errors::{Result, VaultError};
use crate::salt::{PrngSaltGenerator, SaltGenerator};

/// Salt length for password-based derivation (256 bits).
const PASSWORD_SALT_LEN: usize = 32;

/// Configurable Argon2id parameters for password-derived keys.
#[derive(Debug, Clone, Copy)]
pub struct Argon2Params {
    /// Memory cost in KiB (default: 65 536 = 64 MB).
    pub memory_kib: u32,
    /// Number of iterations (default: 3).
    pub iterations: u32,
    /// Parallelism lanes (default: 4).
    pub parallelism: u32,
}

impl Default for Argon2Params {
    fn default() -> Self {
        Self {
            memory_kib: 65_536,
            iterations: 3,
            parallelism: 4,
        }
    }
}

/// Generate a random key of a configured length using the supplied salt
/// source as the randomness source.
pub struct RandomKeyGenerator {
    salt_generator: Arc<dyn SaltGenerator>,
    key_length_bits: usize,
}

impl RandomKeyGenerator {
    pub fn new(salt_generator: Arc<dyn SaltGenerator>, key_length_bits: usize) -> Self {
        Self {
            salt_generator,
            key_length_bits,
        }
    }

    pub fn generate_key(&self, algorithm: &str) -> Result<SecretKey> {
        let bytes = self
            .salt_generator
            .create_salt_bytes(self.key_length_bits / 8)?;
        Ok(SecretKey::new(algorithm, bytes))
    }
}

/// Create a new random AES-256 key.
pub struct Aes256RandomKeyFactory;

impl Aes256RandomKeyFactory {
    pub fn create_key() -> Result<SecretKey> {
        let generator = RandomKeyGenerator::new(
            Arc::new(PrngSaltGenerator::new()),
            AES256_KEY_LENGTH_BITS,
        );
        generator.generate_key(KEY_ALGORITHM_AES)
    }
}

/// Create an AES-256 key from a user-supplied password.
///
/// Derivation is Argon2id, which will block for a while depending on
/// parameters and processor speed.
pub struct Aes256KeyFromPasswordFactory;

impl Aes256KeyFromPasswordFactory {
    /// Derive with default parameters and a unique random salt.
    pub fn create_key(password: &str) -> Result<SecretKey> {
        Self::create_key_with_params(
            password,
            &Argon2Params::default(),
            &PrngSaltGenerator::new(),
        )
    }

    /// Derive with explicit parameters and salt from the supplied
    /// source. The same password + salt + params always produce the
    /// same key.
    pub fn create_key_with_params(
        password: &str,
        params: &Argon2Params,
        salt_generator: &dyn SaltGenerator,
    ) -> Result<SecretKey> {
        let salt = salt_generator.create_salt_bytes(PASSWORD_SALT_LEN)?;

        let argon_params = Params::new(
            params.memory_kib,
            params.iterations,
            params.parallelism,
            Some(AES256_KEY_LENGTH_BITS / 8),
        )
        .map_err(|e| VaultError::Crypto(format!("invalid Argon2 params: {e}")))?;
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon_params);

        let mut key = [0u8; AES256_KEY_LENGTH_BITS / 8];
        argon2
            .hash_password_into(password.as_bytes(), &salt, &mut key)
            .map_err(|e| VaultError::Crypto(format!("Argon2id hashing failed: {e}")))?;

        let secret = SecretKey::new(KEY_ALGORITHM_AES, key.to_vec());
        key.zeroize();
        Ok(secret)
    }
}

/// Derive a key by digesting `seed` with SHA-256; the same seed always
/// produces the same key.
pub fn digest_key(seed: &[u8], algorithm: &str) -> SecretKey {
    let digest = Sha256::digest(seed);
    SecretKey::new(algorithm, digest.to_vec())
}
