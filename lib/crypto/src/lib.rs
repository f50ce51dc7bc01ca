//! Cryptographic primitives for the portcullis authenticate service.
//!
//! This crate provides:
//! - `Cipher`: authenticated encryption (XChaCha20-Poly1305) with associated data
//! - `SharedEncoder`: signing and verification of compact session claims (HS256 JWT)
//! - Signed URLs: HMAC-bound URLs with a bounded validity window
//! - `SigningKey` / `Jwks`: the public key set served to downstream verifiers
//!
//! # Key separation
//!
//! Two independent symmetric keys are in play. The *shared* key is known to
//! every trusted route and backs per-route session handoff and URL signing.
//! The *cookie* key is private to the authenticate service and backs the IdP
//! redirect state. A route that leaks its shared key cannot forge redirect
//! state.
//!
//! # Example
//!
//! ```
//! use portcullis_crypto::{Cipher, generate_key};
//!
//! let cipher = Cipher::new(&generate_key()).expect("32 byte key");
//! let sealed = cipher.encrypt(b"https://app.example.com/", b"nonce|1700000000|").expect("encrypt");
//! let opened = cipher.decrypt(&sealed, b"nonce|1700000000|").expect("decrypt");
//! assert_eq!(opened, b"https://app.example.com/");
//! assert!(cipher.decrypt(&sealed, b"nonce|1700000001|").is_err());
//! ```

pub mod cipher;
pub mod encoder;
pub mod error;
pub mod jwks;
pub mod signed_url;
pub mod timestamp;

pub use cipher::{Cipher, KEY_SIZE, decode_base64_key, generate_key};
pub use encoder::SharedEncoder;
pub use error::CryptoError;
pub use jwks::{Jwk, Jwks, SigningKey};
pub use signed_url::{
    QUERY_EXPIRY, QUERY_ISSUED, QUERY_SIGNATURE, sign_url, sign_url_at, validate_signed_url,
    validate_signed_url_at,
};
pub use timestamp::{DEFAULT_LEEWAY_SECONDS, validate_timestamp};
