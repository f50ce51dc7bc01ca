//! Authenticated encryption with associated data.
//!
//! Ciphertexts are laid out as `sealed || nonce`, where the nonce is a fresh
//! random 24-byte XChaCha20 nonce. Associated data is authenticated but not
//! encrypted, and is never stored in the ciphertext: the caller supplies it
//! again on decryption.

use base64::Engine;
use chacha20poly1305::aead::{Aead, AeadCore, KeyInit, OsRng, Payload};
use chacha20poly1305::{XChaCha20Poly1305, XNonce};
use rand::RngCore;

use crate::error::CryptoError;

/// Size in bytes of every symmetric key used by the service.
pub const KEY_SIZE: usize = 32;

const NONCE_SIZE: usize = 24;

/// An AEAD cipher bound to one symmetric key.
#[derive(Clone)]
pub struct Cipher {
    aead: XChaCha20Poly1305,
}

impl std::fmt::Debug for Cipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cipher").finish_non_exhaustive()
    }
}

impl Cipher {
    /// Creates a cipher from a 32-byte key.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::InvalidKey` if the key has the wrong length.
    pub fn new(key: &[u8]) -> Result<Self, CryptoError> {
        if key.len() != KEY_SIZE {
            return Err(CryptoError::InvalidKey {
                reason: format!("expected {KEY_SIZE} bytes, got {}", key.len()),
            });
        }
        let aead = XChaCha20Poly1305::new_from_slice(key).map_err(|e| CryptoError::InvalidKey {
            reason: e.to_string(),
        })?;
        Ok(Self { aead })
    }

    /// Seals `plaintext`, binding `associated_data` to the ciphertext.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::Encryption` if the cipher rejects the input.
    pub fn encrypt(&self, plaintext: &[u8], associated_data: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let nonce = XChaCha20Poly1305::generate_nonce(&mut OsRng);
        let mut sealed = self
            .aead
            .encrypt(
                &nonce,
                Payload {
                    msg: plaintext,
                    aad: associated_data,
                },
            )
            .map_err(|_| CryptoError::Encryption)?;
        sealed.extend_from_slice(&nonce);
        Ok(sealed)
    }

    /// Opens a ciphertext produced by [`Cipher::encrypt`].
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::Decryption` for truncated input, tampered
    /// ciphertext, mismatched associated data, or the wrong key alike.
    pub fn decrypt(&self, ciphertext: &[u8], associated_data: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if ciphertext.len() < NONCE_SIZE {
            return Err(CryptoError::Decryption);
        }
        let (sealed, nonce) = ciphertext.split_at(ciphertext.len() - NONCE_SIZE);
        self.aead
            .decrypt(
                XNonce::from_slice(nonce),
                Payload {
                    msg: sealed,
                    aad: associated_data,
                },
            )
            .map_err(|_| CryptoError::Decryption)
    }
}

/// Generates a random 32-byte key.
#[must_use]
pub fn generate_key() -> Vec<u8> {
    let mut key = vec![0u8; KEY_SIZE];
    rand::thread_rng().fill_bytes(&mut key);
    key
}

/// Decodes a standard base64 key and checks its length.
///
/// # Errors
///
/// Returns `CryptoError::InvalidKey` if the value is not base64 or does not
/// decode to exactly 32 bytes.
pub fn decode_base64_key(encoded: &str) -> Result<Vec<u8>, CryptoError> {
    let key = base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|e| CryptoError::InvalidKey {
            reason: format!("not valid base64: {e}"),
        })?;
    if key.len() != KEY_SIZE {
        return Err(CryptoError::InvalidKey {
            reason: format!("expected {KEY_SIZE} bytes, got {}", key.len()),
        });
    }
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher() -> Cipher {
        Cipher::new(&generate_key()).expect("valid key")
    }

    #[test]
    fn rejects_short_key() {
        let err = Cipher::new(&[0u8; 16]).unwrap_err();
        assert!(matches!(err, CryptoError::InvalidKey { .. }));
    }

    #[test]
    fn seals_and_opens_with_associated_data() {
        let cipher = cipher();
        let sealed = cipher.encrypt(b"secret", b"context").expect("encrypt");
        assert_ne!(&sealed[..6], b"secret");
        let opened = cipher.decrypt(&sealed, b"context").expect("decrypt");
        assert_eq!(opened, b"secret");
    }

    #[test]
    fn fresh_nonce_per_encryption() {
        let cipher = cipher();
        let a = cipher.encrypt(b"same", b"").expect("encrypt");
        let b = cipher.encrypt(b"same", b"").expect("encrypt");
        assert_ne!(a, b);
    }

    #[test]
    fn associated_data_mismatch_fails() {
        let cipher = cipher();
        let sealed = cipher.encrypt(b"secret", b"nonce|1|").expect("encrypt");
        assert_eq!(
            cipher.decrypt(&sealed, b"nonce|2|"),
            Err(CryptoError::Decryption)
        );
    }

    #[test]
    fn tampering_and_wrong_key_are_indistinguishable() {
        let cipher = cipher();
        let mut sealed = cipher.encrypt(b"secret", b"").expect("encrypt");

        let other = Cipher::new(&generate_key()).expect("valid key");
        let wrong_key = other.decrypt(&sealed, b"").unwrap_err();

        sealed[0] ^= 0x01;
        let tampered = cipher.decrypt(&sealed, b"").unwrap_err();

        assert_eq!(wrong_key, tampered);
        assert_eq!(wrong_key.to_string(), tampered.to_string());
    }

    #[test]
    fn truncated_ciphertext_fails() {
        let cipher = cipher();
        assert_eq!(cipher.decrypt(&[1, 2, 3], b""), Err(CryptoError::Decryption));
    }

    #[test]
    fn decodes_base64_keys() {
        let key = generate_key();
        let encoded = base64::engine::general_purpose::STANDARD.encode(&key);
        assert_eq!(decode_base64_key(&encoded).expect("decode"), key);
        assert!(decode_base64_key("c2hvcnQ=").is_err());
        assert!(decode_base64_key("%%%").is_err());
    }
}
