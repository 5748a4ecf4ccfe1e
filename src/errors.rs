use thiserror::Error;

/// All errors that can occur in prefvault.
#[derive(Debug, Error)]
pub enum VaultError {
    // --- Configuration errors (always propagate) ---
    #[error("Configuration error: {0}")]
    Configuration(String),

    // --- Crypto errors (recoverable: degrade to the caller default) ---
    #[error("Cryptographic operation failed: {0}")]
    Crypto(String),

    /// The input bytes were never produced by the encryption envelope:
    /// missing or mismatched magic/version framing, or not base64 at all.
    /// Distinct from [`VaultError::Crypto`], which signals a bad key or
    /// corrupted ciphertext on an otherwise well-framed input.
    #[error("Content is not encrypted: {0}")]
    Unencrypted(String),

    // --- Key storage upgrade (absorbed by the compat factory) ---
    #[error("Key storage upgrade failed: {0}")]
    Upgrade(String),

    // --- Backing store errors ---
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl VaultError {
    /// True for any failure of a cryptographic transform, including the
    /// framing subtype.
    pub fn is_crypto_failure(&self) -> bool {
        matches!(self, VaultError::Crypto(_) | VaultError::Unencrypted(_))
    }
}

/// Convenience type alias for prefvault results.
pub type Result<T> = std::result::Result<T, VaultError>;
