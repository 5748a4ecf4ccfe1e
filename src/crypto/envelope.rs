//! Versioned encryption envelope.
//!
//! Every persisted value (user data and wrapped-key payloads alike)
//! is framed as:
//!
//! ```text
//! [magic: 1 byte][version: 1 byte][iv_len: 4 bytes BE][iv][ciphertext]
//! ```
//!
//! The cipher is AES-256-CBC with PKCS#7 padding and a fresh random IV
//! per call. The magic and version bytes let `decrypt` tell "this was
//! never produced by `encrypt`" ([`VaultError::Unencrypted`]) apart from
//! "wrong key or corrupted ciphertext" ([`VaultError::Crypto`]).
//!
//! The string layer wraps the binary envelope in standard base64 so the
//! result can live in a string-valued store.

use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::RngCore;

use crate::crypto::SecretKey;
use crate::errors::{Result, VaultError};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// First byte of every envelope.
const HEADER_MAGIC: u8 = 121;

/// Current envelope version.
const HEADER_VERSION: u8 = 1;

/// Fixed-size prefix: magic + version + iv_len.
const HEADER_METADATA_SIZE: usize = 2 + 4;

/// AES block size; CBC initialization vectors are one block.
const IV_LEN: usize = 16;

/// Encrypt `plaintext` under `key`, framing the result as an envelope.
///
/// A fresh random IV is generated for every call; cipher state is never
/// reused.
pub fn encrypt(key: &SecretKey, plaintext: &[u8]) -> Result<Vec<u8>> {
    let mut iv = [0u8; IV_LEN];
    rand::rngs::OsRng.fill_bytes(&mut iv);

    let cipher = Aes256CbcEnc::new_from_slices(key.as_bytes(), &iv)
        .map_err(|e| VaultError::Crypto(format!("invalid key length: {e}")))?;
    let ciphertext = cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext);

    let mut output = Vec::with_capacity(HEADER_METADATA_SIZE + IV_LEN + ciphertext.len());
    output.push(HEADER_MAGIC);
    output.push(HEADER_VERSION);
    output.extend_from_slice(&(IV_LEN as u32).to_be_bytes());
    output.extend_from_slice(&iv);
    output.extend_from_slice(&ciphertext);
    Ok(output)
}

/// Decrypt an envelope produced by [`encrypt`].
///
/// Validates the magic and version bytes before anything else; a
/// mismatch (or an input shorter than the header) raises
/// [`VaultError::Unencrypted`] because the input was never produced by
/// this envelope. A well-framed input that fails to decrypt raises
/// [`VaultError::Crypto`].
pub fn decrypt(key: &SecretKey, data: &[u8]) -> Result<Vec<u8>> {
    if data.len() <= HEADER_METADATA_SIZE {
        return Err(VaultError::Unencrypted("not enough data".into()));
    }
    if data[0] != HEADER_MAGIC {
        return Err(VaultError::Unencrypted("invalid header".into()));
    }
    if data[1] != HEADER_VERSION {
        return Err(VaultError::Unencrypted("incorrect header version".into()));
    }

    let iv_len = u32::from_be_bytes(
        data[2..HEADER_METADATA_SIZE]
            .try_into()
            .expect("slice is four bytes"),
    ) as usize;
    let remaining = data.len() - HEADER_METADATA_SIZE;
    if iv_len == 0 || iv_len > remaining {
        return Err(VaultError::Crypto(format!(
            "declared IV length {iv_len} exceeds available data"
        )));
    }

    let iv = &data[HEADER_METADATA_SIZE..HEADER_METADATA_SIZE + iv_len];
    let ciphertext = &data[HEADER_METADATA_SIZE + iv_len..];

    let cipher = Aes256CbcDec::new_from_slices(key.as_bytes(), iv)
        .map_err(|e| VaultError::Crypto(format!("invalid key or IV length: {e}")))?;
    cipher
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| VaultError::Crypto("decryption failed — wrong key or corrupted data".into()))
}

/// Encrypt a string and base64-encode the envelope for storage.
pub fn encrypt_string(key: &SecretKey, clear_text: &str) -> Result<String> {
    let envelope = encrypt(key, clear_text.as_bytes())?;
    Ok(BASE64.encode(envelope))
}

/// Decode a base64 envelope and decrypt it back to a string.
///
/// Input that is not base64 at all raises [`VaultError::Unencrypted`],
/// the same class as a missing magic byte: either way the value was not
/// produced by [`encrypt_string`].
pub fn decrypt_string(key: &SecretKey, encrypted: &str) -> Result<String> {
    let data = BASE64
        .decode(encrypted)
        .map_err(|_| VaultError::Unencrypted("encrypted string was not base64 encoded".into()))?;
    let plaintext = decrypt(key, &data)?;
    String::from_utf8(plaintext)
        .map_err(|_| VaultError::Crypto("decrypted bytes are not valid UTF-8".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> SecretKey {
        SecretKey::new(crate::crypto::KEY_ALGORITHM_AES, vec![0x42; 32])
    }

    // -----------------------------------------------------------------
    // Round trip
    // -----------------------------------------------------------------

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let key = test_key();
        let envelope = encrypt(&key, b"attack at dawn").unwrap();
        assert_eq!(decrypt(&key, &envelope).unwrap(), b"attack at dawn");
    }

    #[test]
    fn string_roundtrip_is_base64() {
        let key = test_key();
        let stored = encrypt_string(&key, "hello").unwrap();
        assert!(BASE64.decode(&stored).is_ok());
        assert_eq!(decrypt_string(&key, &stored).unwrap(), "hello");
    }

    #[test]
    fn fresh_iv_every_call() {
        let key = test_key();
        let a = encrypt(&key, b"same input").unwrap();
        let b = encrypt(&key, b"same input").unwrap();
        assert_ne!(a, b, "two encryptions of the same input must differ");
    }

    #[test]
    fn empty_plaintext_roundtrip() {
        let key = test_key();
        let envelope = encrypt(&key, b"").unwrap();
        assert_eq!(decrypt(&key, &envelope).unwrap(), b"");
    }

    // -----------------------------------------------------------------
    // Framing errors vs crypto errors
    // -----------------------------------------------------------------

    #[test]
    fn missing_magic_is_a_framing_error() {
        let key = test_key();
        // Valid base64, but plainly not an envelope.
        let stored = BASE64.encode(b"just some plain bytes here");
        let err = decrypt_string(&key, &stored).unwrap_err();
        assert!(matches!(err, VaultError::Unencrypted(_)), "got {err:?}");
    }

    #[test]
    fn bad_version_is_a_framing_error() {
        let key = test_key();
        let mut envelope = encrypt(&key, b"payload").unwrap();
        envelope[1] = HEADER_VERSION + 1;
        let err = decrypt(&key, &envelope).unwrap_err();
        assert!(matches!(err, VaultError::Unencrypted(_)), "got {err:?}");
    }

    #[test]
    fn truncated_input_is_a_framing_error() {
        let key = test_key();
        let err = decrypt(&key, &[HEADER_MAGIC, HEADER_VERSION]).unwrap_err();
        assert!(matches!(err, VaultError::Unencrypted(_)), "got {err:?}");
    }

    #[test]
    fn non_base64_string_is_a_framing_error() {
        let key = test_key();
        let err = decrypt_string(&key, "!!! not base64 !!!").unwrap_err();
        assert!(matches!(err, VaultError::Unencrypted(_)), "got {err:?}");
    }

    #[test]
    fn wrong_key_is_a_crypto_error_not_framing() {
        let key = test_key();
        let other = SecretKey::new(crate::crypto::KEY_ALGORITHM_AES, vec![0x24; 32]);
        let envelope = encrypt(&key, b"sensitive").unwrap();
        // CBC padding can, rarely, unpad garbage without error; what must
        // never happen is the original plaintext or a framing error.
        match decrypt(&other, &envelope) {
            Ok(bytes) => assert_ne!(bytes, b"sensitive"),
            Err(err) => assert!(matches!(err, VaultError::Crypto(_)), "got {err:?}"),
        }
    }

    #[test]
    fn oversized_iv_length_is_a_crypto_error() {
        let key = test_key();
        let mut envelope = encrypt(&key, b"payload").unwrap();
        envelope[2..6].copy_from_slice(&u32::MAX.to_be_bytes());
        let err = decrypt(&key, &envelope).unwrap_err();
        assert!(matches!(err, VaultError::Crypto(_)), "got {err:?}");
    }
}
