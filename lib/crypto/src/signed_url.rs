//! HMAC-bound URLs with a bounded validity window.
//!
//! A signed URL carries three extra query parameters: the issue time, the
//! expiry time, and an HMAC-SHA256 signature over the URL that contains the
//! first two. Any change to the path, the query, or the timestamps invalidates
//! the signature.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use url::Url;

use crate::error::CryptoError;
use crate::timestamp::DEFAULT_LEEWAY_SECONDS;

type HmacSha256 = Hmac<Sha256>;

/// Query parameter holding the Unix time the URL was signed.
pub const QUERY_ISSUED: &str = "pomerium_issued";
/// Query parameter holding the Unix time the signature stops being valid.
pub const QUERY_EXPIRY: &str = "pomerium_expiry";
/// Query parameter holding the URL-safe base64 signature.
pub const QUERY_SIGNATURE: &str = "pomerium_signature";

/// How long a signature stays valid after it is issued.
pub const SIGNATURE_TTL_SECONDS: i64 = 5 * 60;

/// Signs `url` with `key`, valid for five minutes from now.
///
/// # Errors
///
/// Returns `CryptoError::InvalidKey` if the key cannot key an HMAC.
pub fn sign_url(key: &[u8], url: &Url) -> Result<Url, CryptoError> {
    sign_url_at(key, url, chrono::Utc::now().timestamp())
}

/// Signs `url` as if the current time were `now`.
///
/// Any signing parameters already present on the URL are replaced.
///
/// # Errors
///
/// Returns `CryptoError::InvalidKey` if the key cannot key an HMAC.
pub fn sign_url_at(key: &[u8], url: &Url, now: i64) -> Result<Url, CryptoError> {
    let mut pairs = query_without(url, &[QUERY_ISSUED, QUERY_EXPIRY, QUERY_SIGNATURE]);
    pairs.push((QUERY_ISSUED.to_string(), now.to_string()));
    pairs.push((
        QUERY_EXPIRY.to_string(),
        (now + SIGNATURE_TTL_SECONDS).to_string(),
    ));

    let mut signed = url.clone();
    replace_query(&mut signed, &pairs);

    let signature = URL_SAFE_NO_PAD.encode(mac(key, signed.as_str())?.finalize().into_bytes());
    signed
        .query_pairs_mut()
        .append_pair(QUERY_SIGNATURE, &signature);
    Ok(signed)
}

/// Checks the signature and validity window of `url`.
///
/// # Errors
///
/// Returns `CryptoError::InvalidSignature` if a signing parameter is missing,
/// the signature does not match, or the URL claims to be issued in the
/// future. Returns `CryptoError::ExpiredSignature` once the expiry (plus
/// leeway) has passed.
pub fn validate_signed_url(key: &[u8], url: &Url) -> Result<(), CryptoError> {
    validate_signed_url_at(key, url, chrono::Utc::now().timestamp())
}

/// Checks `url` as if the current time were `now`.
///
/// # Errors
///
/// See [`validate_signed_url`].
pub fn validate_signed_url_at(key: &[u8], url: &Url, now: i64) -> Result<(), CryptoError> {
    let param = |name: &str| {
        url.query_pairs()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
    };

    let signature = param(QUERY_SIGNATURE).ok_or(CryptoError::InvalidSignature)?;
    let issued: i64 = param(QUERY_ISSUED)
        .and_then(|v| v.parse().ok())
        .ok_or(CryptoError::InvalidSignature)?;
    let expiry: i64 = param(QUERY_EXPIRY)
        .and_then(|v| v.parse().ok())
        .ok_or(CryptoError::InvalidSignature)?;

    let signature = URL_SAFE_NO_PAD
        .decode(signature.trim_end_matches('='))
        .map_err(|_| CryptoError::InvalidSignature)?;

    let mut unsigned = url.clone();
    replace_query(&mut unsigned, &query_without(url, &[QUERY_SIGNATURE]));
    mac(key, unsigned.as_str())?
        .verify_slice(&signature)
        .map_err(|_| CryptoError::InvalidSignature)?;

    if now - DEFAULT_LEEWAY_SECONDS > expiry {
        return Err(CryptoError::ExpiredSignature);
    }
    if now + DEFAULT_LEEWAY_SECONDS < issued {
        return Err(CryptoError::InvalidSignature);
    }
    Ok(())
}

fn mac(key: &[u8], message: &str) -> Result<HmacSha256, CryptoError> {
    let mut mac = HmacSha256::new_from_slice(key).map_err(|e| CryptoError::InvalidKey {
        reason: e.to_string(),
    })?;
    mac.update(message.as_bytes());
    Ok(mac)
}

fn query_without(url: &Url, names: &[&str]) -> Vec<(String, String)> {
    url.query_pairs()
        .filter(|(k, _)| !names.iter().any(|name| k == name))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}

fn replace_query(url: &mut Url, pairs: &[(String, String)]) {
    url.set_query(None);
    if !pairs.is_empty() {
        url.query_pairs_mut().extend_pairs(pairs);
    }
}
