//! Endpoint paths, query parameter names and URL helpers.

use axum::{
    body::Bytes,
    extract::{FromRequest, Request},
    http::{HeaderMap, Uri, header},
};
use axum_extra::extract::CookieJar;
use portcullis_session::parse_and_validate_url;
use url::Url;

use crate::error::AuthenticateError;

pub const OAUTH_CALLBACK_PATH: &str = "/oauth2/callback";
pub const DASHBOARD_PATH: &str = "/.pomerium/";
pub const SIGN_IN_PATH: &str = "/.pomerium/sign_in";
pub const SIGN_OUT_PATH: &str = "/.pomerium/sign_out";
pub const CALLBACK_PATH: &str = "/.pomerium/callback/";
pub const JWKS_PATH: &str = "/.well-known/pomerium/jwks.json";

pub const QUERY_REDIRECT_URI: &str = "pomerium_redirect_uri";
pub const QUERY_CALLBACK_URI: &str = "pomerium_callback_uri";
pub const QUERY_FORWARD_AUTH: &str = "pomerium_forward_auth";
pub const QUERY_IS_PROGRAMMATIC: &str = "pomerium_programmatic";
pub const QUERY_SESSION_ENCRYPTED: &str = "pomerium_session_encrypted";
pub const QUERY_PROGRAMMATIC_TOKEN: &str = "pomerium_jwt";

/// Cookie that holds a dashboard redirect target after the signed URL that
/// carried it has been consumed.
pub const REDIRECT_COOKIE: &str = "pomerium_redirect_uri";

/// Upper bound on a buffered form body.
pub const MAX_FORM_BYTES: usize = 64 * 1024;

/// Query string and urlencoded form values of a request.
///
/// Lookups consult the query string first, then the form body.
#[derive(Debug, Clone, Default)]
pub struct FormValues {
    query: Vec<(String, String)>,
    form: Vec<(String, String)>,
}

impl FormValues {
    /// Parses the query of `uri` and, for urlencoded requests, `body`.
    #[must_use]
    pub fn parse(uri: &Uri, headers: &HeaderMap, body: &[u8]) -> Self {
        let query = uri.query().map(|q| pairs(q.as_bytes())).unwrap_or_default();
        let form = if is_form_encoded(headers) {
            pairs(body)
        } else {
            Vec::new()
        };
        Self { query, form }
    }

    /// The first non-empty value for `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .chain(self.form.iter())
            .find(|(k, v)| k == name && !v.is_empty())
            .map(|(_, v)| v.as_str())
    }

    /// Returns true if `name` has the value `true`.
    #[must_use]
    pub fn is_true(&self, name: &str) -> bool {
        self.get(name) == Some("true")
    }
}

fn pairs(raw: &[u8]) -> Vec<(String, String)> {
    url::form_urlencoded::parse(raw).into_owned().collect()
}

fn is_form_encoded(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/x-www-form-urlencoded"))
}

impl<S> FromRequest<S> for FormValues
where
    S: Send + Sync,
{
    type Rejection = AuthenticateError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let uri = req.uri().clone();
        let headers = req.headers().clone();
        let body = if is_form_encoded(&headers) {
            Bytes::from_request(req, state)
                .await
                .map_err(|e| AuthenticateError::InvalidRequest {
                    reason: e.body_text(),
                })?
        } else {
            Bytes::new()
        };
        Ok(Self::parse(&uri, &headers, &body))
    }
}

/// Reconstructs the absolute URL a request was made to.
///
/// The scheme comes from the request target, then `X-Forwarded-Proto`, then
/// `base`. The host comes from the request target, then the `Host` header,
/// then `base`.
#[must_use]
pub fn absolute_url(base: &Url, uri: &Uri, headers: &HeaderMap) -> Url {
    let scheme = uri
        .scheme_str()
        .or_else(|| header_str(headers, "x-forwarded-proto"))
        .unwrap_or(base.scheme());
    let host = uri
        .authority()
        .map(|a| a.as_str())
        .or_else(|| header_str(headers, header::HOST.as_str()));
    let path_and_query = uri.path_and_query().map_or("/", |pq| pq.as_str());

    let rebuilt =
        host.and_then(|host| Url::parse(&format!("{scheme}://{host}{path_and_query}")).ok());
    match rebuilt {
        Some(url) => url,
        None => base.join(path_and_query).unwrap_or_else(|_| base.clone()),
    }
}

/// The request's path and query resolved against `base`.
///
/// Only the path and query are taken from the request, so the result always
/// points at `base`'s origin whatever `Host` the client sent.
#[must_use]
pub fn resolve_on(base: &Url, uri: &Uri) -> Url {
    let path_and_query = uri.path_and_query().map_or("/", |pq| pq.as_str());
    base.join(path_and_query).unwrap_or_else(|_| base.clone())
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
}

/// Replaces every value of `name` in the query of `url` with `value`.
pub fn set_query_param(url: &mut Url, name: &str, value: &str) {
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != name)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    let mut pairs = url.query_pairs_mut();
    pairs.clear();
    for (k, v) in &kept {
        pairs.append_pair(k, v);
    }
    pairs.append_pair(name, value);
}

/// The first value of `name` in the query of `url`.
#[must_use]
pub fn query_param(url: &Url, name: &str) -> Option<String> {
    url.query_pairs()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
}

/// The route callback endpoint for `redirect`.
///
/// An explicit `callback_uri` wins; otherwise the callback lives at
/// [`CALLBACK_PATH`] on the redirect target's origin.
///
/// # Errors
///
/// Returns `AuthenticateError::InvalidRequest` if `callback_uri` is present
/// but fails the redirect policy.
pub fn callback_url(redirect: &Url, callback_uri: Option<&str>) -> Result<Url, AuthenticateError> {
    if let Some(raw) = callback_uri {
        return parse_and_validate_url(raw).map_err(|e| AuthenticateError::InvalidRequest {
            reason: format!("{QUERY_CALLBACK_URI}: {e}"),
        });
    }
    let mut url = redirect.clone();
    url.set_path(CALLBACK_PATH);
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}

/// Resolves a post-action redirect target from the request.
///
/// Looks at the query string, then the form body, then the
/// [`REDIRECT_COOKIE`]. Values that fail the redirect policy are ignored.
#[must_use]
pub fn redirect_uri(values: &FormValues, jar: &CookieJar) -> Option<Url> {
    values
        .get(QUERY_REDIRECT_URI)
        .map(str::to_string)
        .or_else(|| {
            jar.get(REDIRECT_COOKIE)
                .map(|c| c.value().to_string())
                .filter(|v| !v.is_empty())
        })
        .and_then(|raw| parse_and_validate_url(&raw).ok())
}
