//! Cryptographic primitives: the secret key type and the versioned
//! encryption envelope used for every persisted value.

pub mod envelope;
mod secret_key;

pub use secret_key::SecretKey;

/// Algorithm identifier for AES keys, as recorded on [`SecretKey`].
pub const KEY_ALGORITHM_AES: &str = "AES";

/// AES-256 key length in bits.
pub const AES256_KEY_LENGTH_BITS: usize = 256;
