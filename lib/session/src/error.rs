//! Error types for the session crate.
//!
//! Errors are designed for layered context using rootcause:
//! - `StateError`: the IdP redirect state and the per-route handoff token
//! - `RedirectUrlError`: redirect targets that fail the URL policy
//! - `DataBrokerError`: storage service failures
//! - `IdentityProviderError`: identity provider failures
//! - `DirectoryError`: directory refresh failures

use std::fmt;

/// Errors from parsing the redirect state or a handoff token.
///
/// Callers report every variant to clients identically so the response does
/// not reveal which check failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    /// Not base64, not UTF-8, or the wrong number of segments.
    Malformed { reason: String },
    /// The issuance timestamp is outside the accepted window.
    Expired,
    /// Authentication tag mismatch.
    Decryption,
    /// The decrypted redirect target failed the URL policy.
    InvalidRedirect { reason: String },
}

impl fmt::Display for StateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed { reason } => write!(f, "malformed state: {reason}"),
            Self::Expired => write!(f, "state has expired"),
            Self::Decryption => write!(f, "state failed to decrypt"),
            Self::InvalidRedirect { reason } => write!(f, "invalid redirect in state: {reason}"),
        }
    }
}

impl std::error::Error for StateError {}

/// Errors from validating a redirect target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedirectUrlError {
    /// No value was supplied.
    Empty,
    /// The value is not an absolute URL.
    Parse { reason: String },
    /// Only `http` and `https` are accepted.
    UnsupportedScheme { scheme: String },
    /// The URL has no host.
    MissingHost,
}

impl fmt::Display for RedirectUrlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "url is empty"),
            Self::Parse { reason } => write!(f, "url is invalid: {reason}"),
            Self::UnsupportedScheme { scheme } => write!(f, "unsupported url scheme: {scheme}"),
            Self::MissingHost => write!(f, "url has no host"),
        }
    }
}

impl std::error::Error for RedirectUrlError {}

/// Errors from the storage service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataBrokerError {
    /// The backend could not be reached or rejected the operation.
    Unavailable { details: String },
    /// A record could not be converted to or from its stored form.
    Serialization {
        record_type: String,
        id: String,
        details: String,
    },
}

impl fmt::Display for DataBrokerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable { details } => write!(f, "databroker unavailable: {details}"),
            Self::Serialization {
                record_type,
                id,
                details,
            } => write!(f, "failed to convert {record_type} record '{id}': {details}"),
        }
    }
}

impl std::error::Error for DataBrokerError {}

/// Errors from the identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityProviderError {
    /// Invalid issuer, client or redirect settings.
    Configuration { details: String },
    /// Provider metadata could not be discovered.
    Discovery { details: String },
    /// The authorization code could not be exchanged.
    Exchange { details: String },
    /// The ID token did not validate.
    TokenValidation { details: String },
    /// A claim the session needs is absent.
    MissingClaim { claim: String },
    /// The token revocation request failed.
    Revocation { details: String },
    /// The userinfo request failed.
    UserInfo { details: String },
    /// The provider has no end-session endpoint.
    SignOutNotImplemented,
}

impl fmt::Display for IdentityProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration { details } => {
                write!(f, "identity provider configuration error: {details}")
            }
            Self::Discovery { details } => {
                write!(f, "identity provider discovery failed: {details}")
            }
            Self::Exchange { details } => write!(f, "code exchange failed: {details}"),
            Self::TokenValidation { details } => write!(f, "id token validation failed: {details}"),
            Self::MissingClaim { claim } => write!(f, "missing required claim: {claim}"),
            Self::Revocation { details } => write!(f, "token revocation failed: {details}"),
            Self::UserInfo { details } => write!(f, "userinfo request failed: {details}"),
            Self::SignOutNotImplemented => write!(f, "identity provider does not support sign out"),
        }
    }
}

impl std::error::Error for IdentityProviderError {}

/// Errors from the directory service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    /// The request could not be sent.
    RequestFailed { details: String },
    /// The directory answered with a non-success status.
    Rejected { status: u16 },
}

impl fmt::Display for DirectoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RequestFailed { details } => write!(f, "directory request failed: {details}"),
            Self::Rejected { status } => {
                write!(f, "directory rejected refresh with status {status}")
            }
        }
    }
}

impl std::error::Error for DirectoryError {}
