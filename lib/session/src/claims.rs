//! Session claims carried by the local artifact, and the identity claims
//! returned by the identity provider.

use std::collections::BTreeMap;

use portcullis_core::{SessionId, UserId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::IdentityProviderError;

/// The local session artifact, signed with the shared key.
///
/// `iss` is the issuer of the identity provider that authenticated the
/// user. The authenticate service never puts its own name there.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    #[serde(rename = "iss", default, skip_serializing_if = "String::is_empty")]
    pub issuer: String,
    #[serde(rename = "sub", default)]
    pub subject: String,
    #[serde(rename = "aud", default)]
    pub audience: Vec<String>,
    #[serde(rename = "exp")]
    pub expiry: i64,
    #[serde(rename = "nbf", default, skip_serializing_if = "Option::is_none")]
    pub not_before: Option<i64>,
    #[serde(rename = "iat", default, skip_serializing_if = "Option::is_none")]
    pub issued_at: Option<i64>,
    #[serde(rename = "jti")]
    pub id: SessionId,
    /// Storage service version of the server record at the last write.
    #[serde(rename = "ver", default, skip_serializing_if = "String::is_empty")]
    pub version: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub programmatic: bool,
}

impl SessionState {
    /// Builds claims for a new session from the identity provider's claims.
    ///
    /// # Errors
    ///
    /// Returns `IdentityProviderError::MissingClaim` if the identity claims
    /// carry no subject.
    pub fn from_identity(
        id: SessionId,
        identity: &IdentityClaims,
        now: i64,
        expiry: i64,
    ) -> Result<Self, IdentityProviderError> {
        let subject = identity
            .subject()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| IdentityProviderError::MissingClaim {
                claim: "sub".to_string(),
            })?;

        Ok(Self {
            issuer: identity.issuer().unwrap_or_default().to_string(),
            subject: subject.to_string(),
            audience: Vec::new(),
            expiry,
            not_before: Some(now),
            issued_at: Some(now),
            id,
            version: String::new(),
            programmatic: false,
        })
    }

    /// Returns a copy scoped to `audience` and reissued at `now`.
    ///
    /// Identity, expiry and version are carried over unchanged.
    #[must_use]
    pub fn reaudience(&self, audience: Vec<String>, now: i64) -> Self {
        Self {
            audience,
            issued_at: Some(now),
            not_before: Some(now),
            programmatic: false,
            ..self.clone()
        }
    }

    /// The storage service user this session belongs to.
    #[must_use]
    pub fn user_id(&self) -> UserId {
        UserId::new(self.subject.clone())
    }

    /// Returns true if `host` is one of the audiences.
    #[must_use]
    pub fn has_audience(&self, host: &str) -> bool {
        self.audience.iter().any(|a| a == host)
    }
}

/// Claims returned by a successful code exchange.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IdentityClaims {
    /// The raw, still-signed ID token as received from the provider.
    pub raw_id_token: String,
    pub claims: Map<String, Value>,
}

impl std::fmt::Debug for IdentityClaims {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityClaims")
            .field("claims", &self.claims)
            .finish_non_exhaustive()
    }
}

impl IdentityClaims {
    #[must_use]
    pub fn new(raw_id_token: String, claims: Map<String, Value>) -> Self {
        Self {
            raw_id_token,
            claims,
        }
    }

    #[must_use]
    pub fn issuer(&self) -> Option<&str> {
        self.claims.get("iss").and_then(Value::as_str)
    }

    #[must_use]
    pub fn subject(&self) -> Option<&str> {
        self.claims.get("sub").and_then(Value::as_str)
    }

    #[must_use]
    pub fn email(&self) -> Option<&str> {
        self.claims.get("email").and_then(Value::as_str)
    }

    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.claims
            .get("name")
            .or_else(|| self.claims.get("preferred_username"))
            .and_then(Value::as_str)
    }

    /// Flattens the claims into a dotted-key, multi-value map.
    #[must_use]
    pub fn flatten(&self) -> FlattenedClaims {
        FlattenedClaims::from_map(&self.claims)
    }
}

/// Claims with nested objects collapsed into dotted keys and every value
/// held as a list.
///
/// `{"address": {"country": "NZ"}, "groups": ["a", "b"]}` becomes
/// `{"address.country": ["NZ"], "groups": ["a", "b"]}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlattenedClaims(BTreeMap<String, Vec<Value>>);

impl FlattenedClaims {
    #[must_use]
    pub fn from_map(claims: &Map<String, Value>) -> Self {
        let mut flattened = BTreeMap::new();
        for (key, value) in claims {
            flatten_into(&mut flattened, key, value);
        }
        Self(flattened)
    }

    /// All values recorded for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> &[Value] {
        self.0.get(key).map(Vec::as_slice).unwrap_or_default()
    }

    /// The first value for `key` if it is a string.
    #[must_use]
    pub fn first_str(&self, key: &str) -> Option<&str> {
        self.get(key).first().and_then(Value::as_str)
    }

    /// Adds every entry of `other`, appending to existing keys.
    pub fn merge(&mut self, other: Self) {
        for (key, values) in other.0 {
            self.0.entry(key).or_default().extend(values);
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn flatten_into(out: &mut BTreeMap<String, Vec<Value>>, key: &str, value: &Value) {
    match value {
        Value::Object(fields) => {
            for (child, child_value) in fields {
                flatten_into(out, &format!("{key}.{child}"), child_value);
            }
        }
        Value::Array(items) => {
            // An empty array still records the key.
            out.entry(key.to_string()).or_default();
            for item in items {
                flatten_into(out, key, item);
            }
        }
        Value::Null => {}
        scalar => out.entry(key.to_string()).or_default().push(scalar.clone()),
    }
}
