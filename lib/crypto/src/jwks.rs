//! The public key set served to downstream verifiers.

use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::cipher::KEY_SIZE;
use crate::error::CryptoError;

/// An Ed25519 key whose public half is published in the JWKS.
#[derive(Clone)]
pub struct SigningKey {
    inner: ed25519_dalek::SigningKey,
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKey")
            .field("kid", &self.key_id())
            .finish_non_exhaustive()
    }
}

impl SigningKey {
    /// Creates a key from a 32-byte Ed25519 seed.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::InvalidKey` if the seed is not 32 bytes.
    pub fn from_seed(seed: &[u8]) -> Result<Self, CryptoError> {
        let seed: [u8; KEY_SIZE] = seed.try_into().map_err(|_| CryptoError::InvalidKey {
            reason: format!("ed25519 seed must be {KEY_SIZE} bytes, got {}", seed.len()),
        })?;
        Ok(Self {
            inner: ed25519_dalek::SigningKey::from_bytes(&seed),
        })
    }

    /// Creates a key from a standard base64 encoded seed.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::InvalidKey` if the value is not base64 or not a
    /// 32-byte seed.
    pub fn from_base64(encoded: &str) -> Result<Self, CryptoError> {
        let seed = STANDARD
            .decode(encoded.trim())
            .map_err(|e| CryptoError::InvalidKey {
                reason: format!("not valid base64: {e}"),
            })?;
        Self::from_seed(&seed)
    }

    /// Returns the raw public key bytes.
    #[must_use]
    pub fn public_key(&self) -> [u8; 32] {
        self.inner.verifying_key().to_bytes()
    }

    /// Returns the RFC 7638 thumbprint of the public key, used as `kid`.
    #[must_use]
    pub fn key_id(&self) -> String {
        let x = URL_SAFE_NO_PAD.encode(self.public_key());
        // Members in lexicographic order, no whitespace.
        let canonical = format!(r#"{{"crv":"Ed25519","kty":"OKP","x":"{x}"}}"#);
        URL_SAFE_NO_PAD.encode(Sha256::digest(canonical.as_bytes()))
    }

    /// Returns the public half as a JWK.
    #[must_use]
    pub fn public_jwk(&self) -> Jwk {
        Jwk {
            kty: "OKP".to_string(),
            crv: "Ed25519".to_string(),
            alg: Some("EdDSA".to_string()),
            key_use: Some("sig".to_string()),
            kid: self.key_id(),
            x: URL_SAFE_NO_PAD.encode(self.public_key()),
        }
    }
}

/// A JSON Web Key set.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Jwks {
    pub keys: Vec<Jwk>,
}

impl Jwks {
    /// A set with no keys.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// The set published for an optional signing key.
    #[must_use]
    pub fn for_key(key: Option<&SigningKey>) -> Self {
        Self {
            keys: key.map(SigningKey::public_jwk).into_iter().collect(),
        }
    }

    /// Find a key by `kid`.
    #[must_use]
    pub fn find_by_kid(&self, kid: &str) -> Option<&Jwk> {
        self.keys.iter().find(|k| k.kid == kid)
    }
}

/// An octet key pair JWK.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Jwk {
    pub kty: String,
    pub crv: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,
    #[serde(rename = "use", skip_serializing_if = "Option::is_none")]
    pub key_use: Option<String>,
    pub kid: String,
    pub x: String,
}
