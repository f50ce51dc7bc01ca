//! Session verification for protected endpoints.

use std::fmt;
use std::sync::Arc;

use axum::{
    Extension,
    extract::Request,
    http::{HeaderMap, Uri},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::CookieJar;
use chrono::Utc;
use portcullis_session::{Session, SessionState, build_redirect_state, databroker};

use crate::error::AuthenticateError;
use crate::sessions::SessionLoadError;
use crate::state::AuthenticateState;
use crate::urls::resolve_on;

/// Claims of a session that passed verification, attached to the request.
#[derive(Debug, Clone)]
pub struct VerifiedSession {
    pub claims: SessionState,
    /// The signed token exactly as the client presented it.
    pub token: String,
}

/// Why a request was sent back to sign-in.
#[derive(Debug)]
pub enum SessionRejection {
    Load(SessionLoadError),
    /// The server record is gone.
    NotFound,
    /// The server record has expired.
    Expired,
    /// The server record could not be read.
    Lookup { details: String },
}

impl fmt::Display for SessionRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Load(e) => write!(f, "{e}"),
            Self::NotFound => write!(f, "session not found"),
            Self::Expired => write!(f, "session expired"),
            Self::Lookup { details } => write!(f, "session lookup failed: {details}"),
        }
    }
}

/// Lets a request through only if its local session resolves to a live
/// server record. Otherwise the caller is sent to sign-in.
pub async fn verify_session(
    Extension(state): Extension<Arc<AuthenticateState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let verified = match verify(&state, request.headers()).await {
        Ok(Ok(verified)) => verified,
        Ok(Err(rejection)) => {
            return reauthenticate_or_fail(&state, request.uri(), request.headers(), &rejection);
        }
        Err(fatal) => return fatal.into_response(),
    };
    request.extensions_mut().insert(verified);
    next.run(request).await
}

/// Checks the local artifact against the server record.
///
/// The outer error is fatal to the request; the inner one means the caller
/// must sign in again.
async fn verify(
    state: &AuthenticateState,
    headers: &HeaderMap,
) -> Result<Result<VerifiedSession, SessionRejection>, AuthenticateError> {
    let broker = state.databroker()?;

    let loaded = match state.sessions.load_verified(headers, &state.encoder) {
        Ok(loaded) => loaded,
        Err(e) => return Ok(Err(SessionRejection::Load(e))),
    };

    let record = match databroker::get::<Session>(broker, loaded.claims.id.as_str()).await {
        Ok(Some(record)) => record,
        Ok(None) => return Ok(Err(SessionRejection::NotFound)),
        Err(e) => {
            return Ok(Err(SessionRejection::Lookup {
                details: e.to_string(),
            }));
        }
    };
    if record.is_expired(Utc::now()) {
        return Ok(Err(SessionRejection::Expired));
    }

    Ok(Ok(VerifiedSession {
        claims: loaded.claims,
        token: loaded.token,
    }))
}

/// Returns true for requests that mark themselves as XHR.
#[must_use]
pub fn is_xhr(headers: &HeaderMap) -> bool {
    headers
        .get("x-requested-with")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("XmlHttpRequest"))
}

/// Starts a new sign-in for the request, or fails it outright for XHR
/// callers, who cannot follow a cross-origin redirect.
pub fn reauthenticate_or_fail(
    state: &AuthenticateState,
    uri: &Uri,
    headers: &HeaderMap,
    rejection: &SessionRejection,
) -> Response {
    if is_xhr(headers) {
        return AuthenticateError::Unauthorized {
            reason: rejection.to_string(),
        }
        .into_response();
    }
    tracing::info!(reason = %rejection, path = uri.path(), "session rejected, reauthenticating");

    match sign_in_redirect(state, uri) {
        Ok(redirect) => {
            let jar = state.sessions.clear(CookieJar::from_headers(headers));
            (jar, redirect).into_response()
        }
        Err(e) => e.into_response(),
    }
}

fn sign_in_redirect(state: &AuthenticateState, uri: &Uri) -> Result<Redirect, AuthenticateError> {
    let return_to = resolve_on(&state.authenticate_url, uri);
    let redirect_state = build_redirect_state(&state.cookie_cipher, &return_to).map_err(|e| {
        AuthenticateError::Internal {
            details: format!("failed to build state: {e}"),
        }
    })?;
    let authorization_url = state
        .provider
        .authorization_url(&redirect_state)
        .map_err(|e| AuthenticateError::Configuration {
            details: e.to_string(),
        })?;
    Ok(Redirect::to(authorization_url.as_str()))
}
