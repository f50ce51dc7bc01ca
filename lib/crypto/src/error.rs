//! Error types for the crypto crate.
//!
//! `Decryption` carries no detail: a tag mismatch caused by tampering and one
//! caused by the wrong key look the same to the caller.

use std::fmt;

/// Errors from codec, cipher and signature operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Key material is missing or has the wrong size.
    InvalidKey { reason: String },
    /// Claims could not be serialized or signed.
    Encoding { reason: String },
    /// Token signature or claims did not validate.
    InvalidToken { reason: String },
    /// The cipher refused to seal the plaintext.
    Encryption,
    /// Authentication tag mismatch.
    Decryption,
    /// Timestamp is not an integer Unix time.
    InvalidTimestamp { reason: String },
    /// Timestamp is older than the accepted window.
    ExpiredTimestamp,
    /// Timestamp is further in the future than the accepted leeway.
    FutureTimestamp,
    /// URL signature is missing or does not match.
    InvalidSignature,
    /// URL signature is valid but its validity window has passed.
    ExpiredSignature,
}

impl fmt::Display for CryptoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidKey { reason } => write!(f, "invalid key: {reason}"),
            Self::Encoding { reason } => write!(f, "failed to encode claims: {reason}"),
            Self::InvalidToken { reason } => write!(f, "invalid token: {reason}"),
            Self::Encryption => write!(f, "encryption failed"),
            Self::Decryption => write!(f, "decryption failed"),
            Self::InvalidTimestamp { reason } => write!(f, "invalid timestamp: {reason}"),
            Self::ExpiredTimestamp => write!(f, "timestamp has expired"),
            Self::FutureTimestamp => write!(f, "timestamp is in the future"),
            Self::InvalidSignature => write!(f, "invalid url signature"),
            Self::ExpiredSignature => write!(f, "url signature has expired"),
        }
    }
}

impl std::error::Error for CryptoError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decryption_error_has_no_detail() {
        assert_eq!(CryptoError::Decryption.to_string(), "decryption failed");
    }

    #[test]
    fn invalid_key_display_includes_reason() {
        let err = CryptoError::InvalidKey {
            reason: "expected 32 bytes, got 16".to_string(),
        };
        assert!(err.to_string().contains("expected 32 bytes"));
    }
}
