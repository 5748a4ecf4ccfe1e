//! The symmetric secret key type.
//!
//! Raw key bytes live only here, in the key-storage cache, or in a
//! transient local during wrap/unwrap. The bytes are zeroed when the
//! value is dropped and are never printed by `Debug`.

use zeroize::{Zeroize, ZeroizeOnDrop};

/// An opaque symmetric key: raw bytes plus an algorithm identifier
/// (e.g. `"AES"`). Only its wrapped form is ever persisted.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SecretKey {
    #[zeroize(skip)]
    algorithm: String,
    bytes: Vec<u8>,
}

impl SecretKey {
    pub fn new(algorithm: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            algorithm: algorithm.into(),
            bytes,
        }
    }

    /// The algorithm this key is intended for.
    pub fn algorithm(&self) -> &str {
        &self.algorithm
    }

    /// Access the raw key bytes (e.g. to pass to a cipher).
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl std::fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never log the actual key material.
        f.debug_struct("SecretKey")
            .field("algorithm", &self.algorithm)
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_output_redacts_key_bytes() {
        let key = SecretKey::new("AES", vec![0xAB; 32]);
        let printed = format!("{key:?}");
        assert!(printed.contains("REDACTED"));
        assert!(!printed.contains("171")); // 0xAB
    }

    #[test]
    fn equality_compares_bytes_and_algorithm() {
        let a = SecretKey::new("AES", vec![1, 2, 3]);
        let b = SecretKey::new("AES", vec![1, 2, 3]);
        let c = SecretKey::new("AES", vec![9, 9, 9]);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
