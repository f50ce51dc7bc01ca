//! The local session store.
//!
//! The local artifact is a signed session JWT. It is read from an ordered
//! list of loaders (the session cookie, then the authorization headers) and
//! written only to the cookie.

use std::fmt;

use axum::http::{HeaderMap, header};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use portcullis_crypto::{CryptoError, SharedEncoder};
use portcullis_session::SessionState;
use time::Duration as TimeDuration;

use crate::config::CookieConfig;

/// Header carrying a session token for programmatic clients.
pub const POMERIUM_AUTHORIZATION_HEADER: &str = "x-pomerium-authorization";

/// Prefix of a session token in the standard `Authorization` header.
const AUTHORIZATION_PREFIX: &str = "Pomerium ";

/// A source of the raw local session artifact.
pub trait SessionLoader: fmt::Debug + Send + Sync {
    /// Returns the raw token if this loader finds one.
    fn load(&self, headers: &HeaderMap) -> Option<String>;
}

/// Loads the token from the session cookie.
#[derive(Debug, Clone)]
pub struct CookieLoader {
    name: String,
}

impl SessionLoader for CookieLoader {
    fn load(&self, headers: &HeaderMap) -> Option<String> {
        CookieJar::from_headers(headers)
            .get(&self.name)
            .map(|c| c.value().to_string())
            .filter(|v| !v.is_empty())
    }
}

/// Loads the token from `Authorization: Pomerium <token>` or
/// `X-Pomerium-Authorization: <token>`.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeaderLoader;

impl SessionLoader for HeaderLoader {
    fn load(&self, headers: &HeaderMap) -> Option<String> {
        let from_authorization = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix(AUTHORIZATION_PREFIX));
        let from_pomerium = headers
            .get(POMERIUM_AUTHORIZATION_HEADER)
            .and_then(|v| v.to_str().ok());

        from_authorization
            .or(from_pomerium)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }
}

/// Why no usable local session was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionLoadError {
    /// No loader found a token.
    NotFound,
    /// A token was found but did not verify.
    Invalid(CryptoError),
}

impl fmt::Display for SessionLoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "no session"),
            Self::Invalid(e) => write!(f, "invalid session token: {e}"),
        }
    }
}

impl std::error::Error for SessionLoadError {}

/// A verified local session and the token it was read from.
#[derive(Debug, Clone)]
pub struct LoadedSession {
    pub claims: SessionState,
    pub token: String,
}

/// Reads, writes and clears the local session artifact.
#[derive(Debug)]
pub struct SessionStore {
    cookie: CookieConfig,
    loaders: Vec<Box<dyn SessionLoader>>,
}

impl SessionStore {
    /// A store backed by the session cookie, then the authorization headers.
    #[must_use]
    pub fn new(cookie: CookieConfig) -> Self {
        let loaders: Vec<Box<dyn SessionLoader>> = vec![
            Box::new(CookieLoader {
                name: cookie.name.clone(),
            }),
            Box::new(HeaderLoader),
        ];
        Self { cookie, loaders }
    }

    /// The first token any loader finds.
    #[must_use]
    pub fn load(&self, headers: &HeaderMap) -> Option<String> {
        self.loaders.iter().find_map(|loader| loader.load(headers))
    }

    /// Loads the token and verifies it with `encoder`.
    ///
    /// # Errors
    ///
    /// Returns `SessionLoadError::NotFound` if there is no token and
    /// `SessionLoadError::Invalid` if it does not verify.
    pub fn load_verified(
        &self,
        headers: &HeaderMap,
        encoder: &SharedEncoder,
    ) -> Result<LoadedSession, SessionLoadError> {
        let token = self.load(headers).ok_or(SessionLoadError::NotFound)?;
        let claims = encoder
            .verify::<SessionState>(&token)
            .map_err(SessionLoadError::Invalid)?;
        Ok(LoadedSession { claims, token })
    }

    /// Writes `token` to the session cookie.
    #[must_use]
    pub fn save(&self, jar: CookieJar, token: String) -> CookieJar {
        let mut cookie = Cookie::build((self.cookie.name.clone(), token))
            .path("/")
            .http_only(self.cookie.http_only)
            .secure(self.cookie.secure)
            .same_site(SameSite::Lax)
            .max_age(TimeDuration::minutes(self.cookie.expire_minutes));
        if let Some(domain) = &self.cookie.domain {
            cookie = cookie.domain(domain.clone());
        }
        jar.add(cookie)
    }

    /// Expires the session cookie.
    #[must_use]
    pub fn clear(&self, jar: CookieJar) -> CookieJar {
        let mut cookie = Cookie::build((self.cookie.name.clone(), ""))
            .path("/")
            .max_age(TimeDuration::ZERO);
        if let Some(domain) = &self.cookie.domain {
            cookie = cookie.domain(domain.clone());
        }
        jar.add(cookie)
    }

    #[must_use]
    pub fn cookie_name(&self) -> &str {
        &self.cookie.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use portcullis_core::SessionId;

    fn store() -> SessionStore {
        SessionStore::new(CookieConfig::default())
    }

    fn encoder() -> SharedEncoder {
        SharedEncoder::new(b"0123456789abcdef0123456789abcdef").expect("encoder")
    }

    fn token(encoder: &SharedEncoder) -> String {
        let claims = SessionState {
            issuer: "https://idp.example.com".to_string(),
            subject: "user-1".to_string(),
            audience: vec!["authenticate.example.com".to_string()],
            expiry: chrono::Utc::now().timestamp() + 3600,
            not_before: None,
            issued_at: None,
            id: SessionId::new("sess-1"),
            version: "1".to_string(),
            programmatic: false,
        };
        encoder.sign(&claims).expect("sign")
    }

    #[test]
    fn cookie_wins_over_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("_pomerium=from-cookie"));
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Pomerium from-header"),
        );
        assert_eq!(store().load(&headers).as_deref(), Some("from-cookie"));
    }

    #[test]
    fn headers_are_tried_in_order() {
        let mut headers = HeaderMap::new();
        headers.insert(
            POMERIUM_AUTHORIZATION_HEADER,
            HeaderValue::from_static("from-pomerium-header"),
        );
        assert_eq!(
            store().load(&headers).as_deref(),
            Some("from-pomerium-header")
        );

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer other"));
        assert_eq!(
            store().load(&headers).as_deref(),
            Some("from-pomerium-header")
        );
    }

    #[test]
    fn load_verified_rejects_missing_and_forged() {
        let encoder = encoder();
        let err = store()
            .load_verified(&HeaderMap::new(), &encoder)
            .unwrap_err();
        assert_eq!(err, SessionLoadError::NotFound);

        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("_pomerium=a.b.c"));
        let err = store().load_verified(&headers, &encoder).unwrap_err();
        assert!(matches!(err, SessionLoadError::Invalid(_)));
    }

    #[test]
    fn load_verified_returns_claims_and_raw_token() {
        let encoder = encoder();
        let raw = token(&encoder);
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Pomerium {raw}")).expect("header"),
        );

        let loaded = store().load_verified(&headers, &encoder).expect("verified");
        assert_eq!(loaded.token, raw);
        assert_eq!(loaded.claims.id, SessionId::new("sess-1"));
    }

    #[test]
    fn save_and_clear_set_cookie_attributes() {
        let store = store();
        let jar = store.save(CookieJar::new(), "jwt".to_string());
        let cookie = jar.get("_pomerium").expect("cookie set");
        assert_eq!(cookie.value(), "jwt");
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.path(), Some("/"));

        let jar = store.clear(jar);
        let cookie = jar.get("_pomerium").expect("cookie present");
        assert_eq!(cookie.value(), "");
        assert_eq!(cookie.max_age(), Some(TimeDuration::ZERO));
    }
}
