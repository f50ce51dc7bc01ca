//! Per-route sign-in: hands an existing session to a route.

use std::sync::Arc;

use axum::{
    Extension,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::CookieJar;
use chrono::Utc;
use portcullis_crypto::sign_url;
use portcullis_session::{encrypt_handoff_token, host_with_port, parse_and_validate_url};
use url::Url;

use super::verify::VerifiedSession;
use crate::error::AuthenticateError;
use crate::state::AuthenticateState;
use crate::urls::{
    FormValues, QUERY_CALLBACK_URI, QUERY_FORWARD_AUTH, QUERY_IS_PROGRAMMATIC, QUERY_REDIRECT_URI,
    QUERY_SESSION_ENCRYPTED, callback_url, set_query_param,
};

/// Mints a per-route session token and redirects to the route's callback.
///
/// The caller's session is re-audienced for the target route, signed,
/// encrypted under the shared cipher and attached to a signed callback URL.
pub async fn sign_in(
    Extension(state): Extension<Arc<AuthenticateState>>,
    Extension(session): Extension<VerifiedSession>,
    jar: CookieJar,
    values: FormValues,
) -> Result<Response, AuthenticateError> {
    let redirect = values
        .get(QUERY_REDIRECT_URI)
        .ok_or_else(|| AuthenticateError::InvalidRequest {
            reason: format!("{QUERY_REDIRECT_URI} is required"),
        })
        .and_then(|raw| {
            parse_and_validate_url(raw).map_err(|e| AuthenticateError::InvalidRequest {
                reason: format!("{QUERY_REDIRECT_URI}: {e}"),
            })
        })?;

    let callback_uri = values.get(QUERY_CALLBACK_URI);
    let mut callback = callback_url(&redirect, callback_uri)?;
    let audience = route_audience(
        &state,
        &redirect,
        callback_uri.map(|_| &callback),
        values.get(QUERY_FORWARD_AUTH),
    );

    // The server record may have been evicted while the cookie survived.
    let jar = state.sessions.save(jar, session.token.clone());

    let programmatic = values.is_true(QUERY_IS_PROGRAMMATIC);
    let mut route_session = session.claims.reaudience(audience, Utc::now().timestamp());
    route_session.programmatic = programmatic;

    let signed = state
        .encoder
        .sign(&route_session)
        .map_err(|e| AuthenticateError::Internal {
            details: format!("failed to sign session: {e}"),
        })?;
    let encrypted = encrypt_handoff_token(&state.shared_cipher, &signed).map_err(|e| {
        AuthenticateError::Internal {
            details: format!("failed to encrypt session: {e}"),
        }
    })?;

    if programmatic {
        set_query_param(&mut callback, QUERY_IS_PROGRAMMATIC, "true");
    }
    set_query_param(&mut callback, QUERY_SESSION_ENCRYPTED, &encrypted);
    set_query_param(&mut callback, QUERY_REDIRECT_URI, redirect.as_str());

    let callback = sign_url(&state.shared_key, &callback).map_err(|e| {
        AuthenticateError::Internal {
            details: format!("failed to sign callback url: {e}"),
        }
    })?;

    tracing::debug!(
        session_id = %route_session.id,
        route = %host_with_port(&redirect),
        programmatic,
        "handing session to route"
    );
    Ok((jar, Redirect::to(callback.as_str())).into_response())
}

/// Hosts a per-route token is valid for, without duplicates.
fn route_audience(
    state: &AuthenticateState,
    redirect: &Url,
    callback: Option<&Url>,
    forward_auth: Option<&str>,
) -> Vec<String> {
    let candidates = [
        Some(state.authenticate_host()),
        Some(host_with_port(redirect)),
        callback.map(host_with_port),
        forward_auth.map(str::to_string),
    ];

    let mut audience: Vec<String> = Vec::with_capacity(candidates.len());
    for host in candidates.into_iter().flatten() {
        if !audience.contains(&host) {
            audience.push(host);
        }
    }
    audience
}
