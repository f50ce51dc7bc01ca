//! Compact, integrity-protected session claims.
//!
//! Claims are signed as HS256 JWTs under the shared key so that every trusted
//! route can verify a session token handed to it.

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::CryptoError;

/// Signs and verifies claims with a service-wide symmetric key.
#[derive(Clone)]
pub struct SharedEncoder {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl std::fmt::Debug for SharedEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedEncoder").finish_non_exhaustive()
    }
}

impl SharedEncoder {
    /// Creates an encoder for the given shared key.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::InvalidKey` if the key is empty.
    pub fn new(key: &[u8]) -> Result<Self, CryptoError> {
        if key.is_empty() {
            return Err(CryptoError::InvalidKey {
                reason: "signing key is empty".to_string(),
            });
        }

        let mut validation = Validation::new(Algorithm::HS256);
        // Audience is enforced by the route that consumes the token.
        validation.validate_aud = false;

        Ok(Self {
            encoding: EncodingKey::from_secret(key),
            decoding: DecodingKey::from_secret(key),
            validation,
        })
    }

    /// Serializes and signs `claims`.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::Encoding` if the claims cannot be serialized.
    pub fn sign<T: Serialize>(&self, claims: &T) -> Result<String, CryptoError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding).map_err(|e| {
            CryptoError::Encoding {
                reason: e.to_string(),
            }
        })
    }

    /// Verifies the signature and expiry of `token` and parses its claims.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::InvalidToken` if the signature does not validate,
    /// the token has expired, or the payload does not parse into `T`.
    pub fn verify<T: DeserializeOwned>(&self, token: &str) -> Result<T, CryptoError> {
        decode::<T>(token.trim(), &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| CryptoError::InvalidToken {
                reason: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct TestClaims {
        sub: String,
        exp: i64,
        aud: Vec<String>,
    }

    fn claims(exp: i64) -> TestClaims {
        TestClaims {
            sub: "alice".to_string(),
            exp,
            aud: vec!["app.example.com".to_string()],
        }
    }

    fn future() -> i64 {
        chrono::Utc::now().timestamp() + 3600
    }

    #[test]
    fn sign_then_verify() {
        let encoder = SharedEncoder::new(b"0123456789abcdef0123456789abcdef").expect("encoder");
        let token = encoder.sign(&claims(future())).expect("sign");
        assert_eq!(token.split('.').count(), 3);

        let parsed: TestClaims = encoder.verify(&token).expect("verify");
        assert_eq!(parsed.sub, "alice");
    }

    #[test]
    fn verify_rejects_other_key() {
        let a = SharedEncoder::new(b"key-a").expect("encoder");
        let b = SharedEncoder::new(b"key-b").expect("encoder");
        let token = a.sign(&claims(future())).expect("sign");

        let err = b.verify::<TestClaims>(&token).unwrap_err();
        assert!(matches!(err, CryptoError::InvalidToken { .. }));
    }

    #[test]
    fn verify_rejects_expired_token() {
        let encoder = SharedEncoder::new(b"key").expect("encoder");
        let token = encoder
            .sign(&claims(chrono::Utc::now().timestamp() - 3600))
            .expect("sign");

        assert!(encoder.verify::<TestClaims>(&token).is_err());
    }

    #[test]
    fn verify_rejects_garbage() {
        let encoder = SharedEncoder::new(b"key").expect("encoder");
        assert!(encoder.verify::<TestClaims>("not.a.jwt").is_err());
        assert!(encoder.verify::<TestClaims>("").is_err());
    }

    #[test]
    fn verify_rejects_unparsable_claims() {
        #[derive(Serialize)]
        struct Other {
            exp: i64,
        }

        let encoder = SharedEncoder::new(b"key").expect("encoder");
        let token = encoder.sign(&Other { exp: future() }).expect("sign");
        assert!(encoder.verify::<TestClaims>(&token).is_err());
    }

    #[test]
    fn empty_key_is_rejected() {
        assert!(SharedEncoder::new(b"").is_err());
    }
}
