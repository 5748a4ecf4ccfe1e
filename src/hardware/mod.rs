//! The secure hardware module boundary.
//!
//! Platform implementations should use hardware-backed key storage where
//! available (Android Keystore, Apple Secure Enclave, a TPM). The module
//! generates and guards asymmetric key pairs by alias; private key
//! material ideally never leaves the hardware. [`SoftwareKeyStore`] is
//! the in-process stand-in used in tests and on hosts without a secure
//! module.

mod software;

pub use software::SoftwareKeyStore;

use rsa::{RsaPrivateKey, RsaPublicKey};

use crate::errors::Result;

/// Parameters for a generated key pair's certificate.
#[derive(Debug, Clone)]
pub struct KeyPairSpec {
    /// Certificate subject, e.g. `CN=<alias>`.
    pub subject: String,
    /// Validity window in years from generation time.
    pub validity_years: u32,
}

impl KeyPairSpec {
    /// The spec used for vault key-wrapping pairs: subject derived from
    /// the alias, 100-year validity.
    pub fn for_alias(alias: &str) -> Self {
        Self {
            subject: format!("CN={alias}"),
            validity_years: 100,
        }
    }
}

/// An asymmetric key pair retrieved from the module.
#[derive(Clone)]
pub struct KeyPair {
    pub public: RsaPublicKey,
    pub private: RsaPrivateKey,
}

/// Generate/retrieve/delete asymmetric key pairs by alias.
///
/// `generate_key_pair` must be an idempotent get-or-create: concurrent
/// calls for the same alias are serialized inside the module and exactly
/// one pair is generated. Callers re-read the pair after generation to
/// confirm it is usable before trusting it.
pub trait HardwareKeyStore: Send + Sync {
    /// Whether a pair exists under `alias`.
    fn contains_alias(&self, alias: &str) -> Result<bool>;

    /// Create a pair under `alias` if none exists.
    fn generate_key_pair(&self, alias: &str, spec: &KeyPairSpec) -> Result<()>;

    /// Read the pair stored under `alias`, if any.
    fn key_pair(&self, alias: &str) -> Result<Option<KeyPair>>;

    /// Delete the pair stored under `alias`. Deleting an absent alias is
    /// not an error.
    fn delete_entry(&self, alias: &str) -> Result<()>;
}
