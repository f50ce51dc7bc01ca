//! The opaque values that carry context through redirects.
//!
//! The IdP `state` parameter is `base64url(nonce "|" timestamp "|" sealed)`,
//! where `sealed` is the redirect URL encrypted under the cookie cipher with
//! the `nonce|timestamp|` prefix as associated data. Changing any byte of the
//! nonce, the timestamp or the ciphertext breaks decryption.
//!
//! The per-route handoff token is the signed session JWT encrypted under the
//! shared cipher with no associated data. The JWT's own expiry bounds its
//! lifetime.

use base64::Engine;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig, URL_SAFE_NO_PAD};
use base64::engine::{DecodePaddingMode, general_purpose};
use portcullis_crypto::{Cipher, CryptoError, validate_timestamp};
use rand::RngCore;
use url::Url;

use crate::error::StateError;
use crate::redirect_url::parse_and_validate_url;

const SEPARATOR: u8 = b'|';
const NONCE_BYTES: usize = 32;

/// Padded URL-safe output, accepting input with or without padding.
const STATE_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &base64::alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Generates a fresh anti-replay nonce.
#[must_use]
pub fn generate_nonce() -> String {
    let mut nonce = [0u8; NONCE_BYTES];
    rand::thread_rng().fill_bytes(&mut nonce);
    URL_SAFE_NO_PAD.encode(nonce)
}

/// Builds the IdP `state` for `redirect_url` with a fresh nonce.
///
/// # Errors
///
/// Returns `CryptoError::Encryption` if the cipher fails to seal the URL.
pub fn build_redirect_state(cipher: &Cipher, redirect_url: &Url) -> Result<String, CryptoError> {
    build_redirect_state_at(
        cipher,
        &generate_nonce(),
        redirect_url,
        chrono::Utc::now().timestamp(),
    )
}

/// Builds the IdP `state` with an explicit nonce and issuance time.
///
/// # Errors
///
/// Returns `CryptoError::Encryption` if the cipher fails to seal the URL.
pub fn build_redirect_state_at(
    cipher: &Cipher,
    nonce: &str,
    redirect_url: &Url,
    issued_at: i64,
) -> Result<String, CryptoError> {
    let mut state = format!("{nonce}|{issued_at}|").into_bytes();
    let sealed = cipher.encrypt(redirect_url.as_str().as_bytes(), &state)?;
    state.extend_from_slice(&sealed);
    Ok(STATE_ENGINE.encode(state))
}

/// Recovers and validates the redirect URL from an IdP `state`.
///
/// # Errors
///
/// Returns a `StateError` if the state cannot be decoded, has expired, fails
/// to decrypt, or holds a URL that fails the redirect policy.
pub fn parse_redirect_state(cipher: &Cipher, encoded: &str) -> Result<Url, StateError> {
    parse_redirect_state_at(cipher, encoded, chrono::Utc::now().timestamp())
}

/// Parses an IdP `state` as if the current time were `now`.
///
/// # Errors
///
/// See [`parse_redirect_state`].
pub fn parse_redirect_state_at(cipher: &Cipher, encoded: &str, now: i64) -> Result<Url, StateError> {
    let bytes = STATE_ENGINE
        .decode(encoded.trim())
        .map_err(|e| StateError::Malformed {
            reason: e.to_string(),
        })?;

    let mut parts = bytes.splitn(3, |b| *b == SEPARATOR);
    let (Some(nonce), Some(timestamp), Some(sealed)) = (parts.next(), parts.next(), parts.next())
    else {
        return Err(StateError::Malformed {
            reason: "expected nonce, timestamp and ciphertext".to_string(),
        });
    };

    let timestamp = std::str::from_utf8(timestamp).map_err(|_| StateError::Malformed {
        reason: "timestamp is not utf-8".to_string(),
    })?;
    validate_timestamp(timestamp, now).map_err(|e| match e {
        CryptoError::InvalidTimestamp { reason } => StateError::Malformed { reason },
        _ => StateError::Expired,
    })?;

    let prefix = &bytes[..nonce.len() + timestamp.len() + 2];
    let redirect = cipher
        .decrypt(sealed, prefix)
        .map_err(|_| StateError::Decryption)?;
    let redirect = String::from_utf8(redirect).map_err(|_| StateError::InvalidRedirect {
        reason: "redirect is not utf-8".to_string(),
    })?;

    parse_and_validate_url(&redirect).map_err(|e| StateError::InvalidRedirect {
        reason: e.to_string(),
    })
}

/// Encrypts a signed session JWT for transport in a query string.
///
/// # Errors
///
/// Returns `CryptoError::Encryption` if the cipher fails to seal the token.
pub fn encrypt_handoff_token(shared: &Cipher, signed_jwt: &str) -> Result<String, CryptoError> {
    let sealed = shared.encrypt(signed_jwt.as_bytes(), &[])?;
    Ok(general_purpose::URL_SAFE.encode(sealed))
}

/// Recovers the signed session JWT from a handoff token, byte for byte.
///
/// # Errors
///
/// Returns `StateError::Malformed` if the token is not base64 or the
/// plaintext is not UTF-8, and `StateError::Decryption` if it fails to
/// decrypt.
pub fn decrypt_handoff_token(shared: &Cipher, encoded: &str) -> Result<String, StateError> {
    let sealed = STATE_ENGINE
        .decode(encoded.trim())
        .map_err(|e| StateError::Malformed {
            reason: e.to_string(),
        })?;
    let jwt = shared
        .decrypt(&sealed, &[])
        .map_err(|_| StateError::Decryption)?;
    String::from_utf8(jwt).map_err(|_| StateError::Malformed {
        reason: "session token is not utf-8".to_string(),
    })
}
