//! Records held by the storage service.
//!
//! The server session record is the authoritative half of a session; the
//! local [`SessionState`] is only a capability pointing at it.

use chrono::{DateTime, Utc};
use portcullis_core::{SessionId, UserId};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::claims::{FlattenedClaims, SessionState};

/// A value stored in the storage service under a type and an id.
pub trait Record: Serialize + DeserializeOwned + Send + Sync {
    /// Namespace of this record type in the storage service.
    const RECORD_TYPE: &'static str;

    fn record_id(&self) -> &str;
}

/// The server-side session record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub user_id: UserId,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub id_token: IdToken,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oauth_token: Option<OAuthToken>,
    #[serde(default)]
    pub claims: FlattenedClaims,
    #[serde(default)]
    pub audience: Vec<String>,
    /// Session whose identity this session acts as, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub impersonate_session_id: Option<SessionId>,
}

impl Session {
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

impl Record for Session {
    const RECORD_TYPE: &'static str = "session";

    fn record_id(&self) -> &str {
        self.id.as_str()
    }
}

/// The identity provider's ID token as stored with a session.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct IdToken {
    pub issuer: String,
    pub subject: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// The original signed token, used as `id_token_hint` at sign-out.
    #[serde(default)]
    pub raw: String,
}

impl std::fmt::Debug for IdToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdToken")
            .field("issuer", &self.issuer)
            .field("subject", &self.subject)
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

/// OAuth2 tokens returned by the code exchange.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthToken {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl OAuthToken {
    /// A bearer token with no refresh token or expiry.
    #[must_use]
    pub fn bearer(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            token_type: default_token_type(),
            expires_at: None,
        }
    }
}

impl std::fmt::Debug for OAuthToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthToken")
            .field("token_type", &self.token_type)
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

/// A user known to the storage service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default)]
    pub claims: FlattenedClaims,
}

impl User {
    /// A user with no profile data yet.
    #[must_use]
    pub fn new(id: UserId) -> Self {
        Self {
            id,
            name: None,
            email: None,
            claims: FlattenedClaims::default(),
        }
    }
}

impl Record for User {
    const RECORD_TYPE: &'static str = "user";

    fn record_id(&self) -> &str {
        self.id.as_str()
    }
}

/// A user as seen by the directory service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryUser {
    pub id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default)]
    pub group_ids: Vec<String>,
}

impl DirectoryUser {
    #[must_use]
    pub fn new(id: UserId) -> Self {
        Self {
            id,
            display_name: None,
            email: None,
            group_ids: Vec::new(),
        }
    }
}

impl Record for DirectoryUser {
    const RECORD_TYPE: &'static str = "directory.user";

    fn record_id(&self) -> &str {
        self.id.as_str()
    }
}

/// A directory group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryGroup {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl DirectoryGroup {
    /// Stand-in for a group whose record could not be loaded.
    #[must_use]
    pub fn placeholder(id: &str) -> Self {
        Self {
            id: id.to_string(),
            name: id.to_string(),
            email: Some(id.to_string()),
        }
    }
}

impl Record for DirectoryGroup {
    const RECORD_TYPE: &'static str = "directory.group";

    fn record_id(&self) -> &str {
        &self.id
    }
}

/// What the dashboard knows about the caller's session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionView {
    /// A local session backed by a live server record.
    Authenticated { claims: SessionState },
    /// A session acting as another session's user.
    Impersonated {
        claims: SessionState,
        /// The user who started the impersonation.
        actor_id: UserId,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn session() -> Session {
        let now = Utc::now();
        Session {
            id: SessionId::new("sess-1"),
            user_id: UserId::new("user-1"),
            issued_at: now,
            expires_at: now + Duration::hours(1),
            id_token: IdToken {
                issuer: "https://idp.example.com".to_string(),
                subject: "user-1".to_string(),
                issued_at: now,
                expires_at: now + Duration::hours(1),
                raw: "raw.id.token".to_string(),
            },
            oauth_token: Some(OAuthToken::bearer("access-secret")),
            claims: FlattenedClaims::default(),
            audience: vec!["authenticate.example.com".to_string()],
            impersonate_session_id: None,
        }
    }

    #[test]
    fn session_expiry() {
        let session = session();
        assert!(!session.is_expired(Utc::now()));
        assert!(session.is_expired(session.expires_at));
    }

    #[test]
    fn debug_output_hides_tokens() {
        let debug = format!("{:?}", session());
        assert!(!debug.contains("access-secret"));
        assert!(!debug.contains("raw.id.token"));
    }

    #[test]
    fn session_json_keeps_raw_id_token() {
        let json = serde_json::to_value(session()).expect("serialize");
        assert_eq!(json["id_token"]["raw"], "raw.id.token");
        assert!(json.get("impersonate_session_id").is_none());
    }

    #[test]
    fn record_types_are_distinct() {
        let types = [
            Session::RECORD_TYPE,
            User::RECORD_TYPE,
            DirectoryUser::RECORD_TYPE,
            DirectoryGroup::RECORD_TYPE,
        ];
        for (i, a) in types.iter().enumerate() {
            for b in &types[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn group_placeholder_uses_id_everywhere() {
        let group = DirectoryGroup::placeholder("g-42");
        assert_eq!(group.name, "g-42");
        assert_eq!(group.email.as_deref(), Some("g-42"));
    }
}
