//! The identity provider callback and the per-route callback.

use std::sync::Arc;

use axum::{
    Extension,
    extract::Query,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::CookieJar;
use chrono::{DateTime, Utc};
use portcullis_core::SessionId;
use portcullis_session::{
    DirectoryError, IdToken, IdentityClaims, OAuthToken, Session, SessionState, User, databroker,
    decrypt_handoff_token, host_with_port, parse_and_validate_url, parse_redirect_state,
};
use rootcause::prelude::Report;
use serde::Deserialize;
use tracing::instrument;
use url::Url;

use crate::error::AuthenticateError;
use crate::state::AuthenticateState;
use crate::urls::{
    FormValues, QUERY_IS_PROGRAMMATIC, QUERY_PROGRAMMATIC_TOKEN, QUERY_REDIRECT_URI,
    QUERY_SESSION_ENCRYPTED, query_param, set_query_param,
};

/// Query parameters the identity provider sends back.
#[derive(Debug, Default, Deserialize)]
pub struct CallbackQuery {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Completes sign-in after the identity provider redirects back.
pub async fn oauth_callback(
    Extension(state): Extension<Arc<AuthenticateState>>,
    jar: CookieJar,
    Query(query): Query<CallbackQuery>,
) -> Result<Response, AuthenticateError> {
    let (token, redirect) = handle_callback(&state, &query).await?;
    let jar = state.sessions.save(jar, token);
    Ok((jar, Redirect::to(redirect.as_str())).into_response())
}

/// Exchanges the code, persists the new session and returns its signed
/// token with the validated redirect target.
async fn handle_callback(
    state: &AuthenticateState,
    query: &CallbackQuery,
) -> Result<(String, Url), AuthenticateError> {
    if let Some(code) = query.error.as_deref().filter(|e| !e.is_empty()) {
        return Err(AuthenticateError::IdentityProvider {
            code: code.to_string(),
        });
    }
    let code = query
        .code
        .as_deref()
        .filter(|c| !c.is_empty())
        .ok_or(AuthenticateError::MissingCode)?;

    let (oauth_token, identity) = state.provider.authenticate(code).await.map_err(|e| {
        AuthenticateError::Exchange {
            details: e.to_string(),
        }
    })?;

    let redirect = parse_redirect_state(
        &state.cookie_cipher,
        query.state.as_deref().unwrap_or_default(),
    )?;

    let now = Utc::now();
    let expires_at = now + state.session_lifetime;
    let mut claims = SessionState::from_identity(
        SessionId::generate(),
        &identity,
        now.timestamp(),
        expires_at.timestamp(),
    )
    .map_err(|e| AuthenticateError::Exchange {
        details: e.to_string(),
    })?;
    claims.audience = callback_audience(state, &redirect);

    let persisted =
        save_session_to_databroker(state, &claims, &oauth_token, &identity, now, expires_at)
            .await?;
    claims.version = persisted.version.to_string();
    // Best-effort: the user is signed in whether or not the directory caught up.
    if let Err(e) = persisted.directory_refresh {
        tracing::warn!(error = %e, user_id = %claims.user_id(), "directory refresh failed");
    }

    let token = state
        .encoder
        .sign(&claims)
        .map_err(|e| AuthenticateError::Internal {
            details: format!("failed to sign session: {e}"),
        })?;

    tracing::info!(
        session_id = %claims.id,
        user_id = %claims.user_id(),
        provider = state.provider.name(),
        "user signed in"
    );
    Ok((token, redirect))
}

/// This service's host, plus the host of a redirect target nested in
/// `redirect` when there is one.
fn callback_audience(state: &AuthenticateState, redirect: &Url) -> Vec<String> {
    let mut audience = vec![state.authenticate_host()];
    let nested = query_param(redirect, QUERY_REDIRECT_URI)
        .and_then(|raw| parse_and_validate_url(&raw).ok())
        .map(|url| host_with_port(&url));
    if let Some(host) = nested {
        if !audience.contains(&host) {
            audience.push(host);
        }
    }
    audience
}

/// The result of persisting a new session.
#[must_use]
pub struct PersistedSession {
    /// Storage service version of the session record write.
    pub version: u64,
    /// Outcome of the best-effort directory refresh. Never fatal.
    pub directory_refresh: Result<(), Report<DirectoryError>>,
}

/// Writes the user record, then the session record, then asks the
/// directory to refresh the user.
///
/// # Errors
///
/// Fails if the provider cannot enrich the user or either write fails. The
/// directory refresh outcome is returned, not raised.
#[instrument(skip_all, fields(session_id = %claims.id))]
pub async fn save_session_to_databroker(
    state: &AuthenticateState,
    claims: &SessionState,
    oauth_token: &OAuthToken,
    identity: &IdentityClaims,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
) -> Result<PersistedSession, AuthenticateError> {
    let broker = state.databroker()?;
    let user_id = claims.user_id();

    let mut user = match databroker::get::<User>(broker, user_id.as_str()).await {
        Ok(Some(user)) => user,
        Ok(None) => User::new(user_id.clone()),
        Err(e) => {
            tracing::debug!(error = %e, "user lookup failed, starting a new record");
            User::new(user_id.clone())
        }
    };
    if user.email.is_none() {
        user.email = identity.email().map(str::to_string);
    }
    if user.name.is_none() {
        user.name = identity.name().map(str::to_string);
    }
    user.claims = identity.flatten();
    state
        .provider
        .update_user_info(oauth_token, &mut user)
        .await
        .map_err(|e| AuthenticateError::UserInfo {
            details: e.to_string(),
        })?;
    databroker::put(broker, &user).await.map_err(storage_error)?;

    let session = Session {
        id: claims.id.clone(),
        user_id: user_id.clone(),
        issued_at,
        expires_at,
        id_token: id_token(identity, issued_at, expires_at),
        oauth_token: Some(oauth_token.clone()),
        claims: identity.flatten(),
        audience: claims.audience.clone(),
        impersonate_session_id: None,
    };
    let version = databroker::put(broker, &session)
        .await
        .map_err(storage_error)?;

    let directory_refresh = state
        .directory
        .refresh_user(&user_id, &oauth_token.access_token)
        .await;

    Ok(PersistedSession {
        version,
        directory_refresh,
    })
}

fn id_token(
    identity: &IdentityClaims,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
) -> IdToken {
    let timestamp = |claim: &str| {
        identity
            .claims
            .get(claim)
            .and_then(serde_json::Value::as_i64)
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
    };
    IdToken {
        issuer: identity.issuer().unwrap_or_default().to_string(),
        subject: identity.subject().unwrap_or_default().to_string(),
        issued_at: timestamp("iat").unwrap_or(issued_at),
        expires_at: timestamp("exp").unwrap_or(expires_at),
        raw: identity.raw_id_token.clone(),
    }
}

fn storage_error<E: std::fmt::Display>(err: E) -> AuthenticateError {
    AuthenticateError::Storage {
        details: err.to_string(),
    }
}

/// Stores a session handed over by the authenticate service and continues
/// to the route's redirect target.
///
/// Programmatic callers also receive the token in the redirect query.
pub async fn route_callback(
    Extension(state): Extension<Arc<AuthenticateState>>,
    jar: CookieJar,
    values: FormValues,
) -> Result<Response, AuthenticateError> {
    let mut redirect = values
        .get(QUERY_REDIRECT_URI)
        .ok_or_else(|| AuthenticateError::InvalidRequest {
            reason: format!("{QUERY_REDIRECT_URI} is required"),
        })
        .and_then(|raw| {
            parse_and_validate_url(raw).map_err(|e| AuthenticateError::InvalidRequest {
                reason: format!("{QUERY_REDIRECT_URI}: {e}"),
            })
        })?;
    let encrypted = values
        .get(QUERY_SESSION_ENCRYPTED)
        .ok_or_else(|| AuthenticateError::InvalidRequest {
            reason: format!("{QUERY_SESSION_ENCRYPTED} is required"),
        })?;

    let token = decrypt_handoff_token(&state.shared_cipher, encrypted)?;

    if values.is_true(QUERY_IS_PROGRAMMATIC) {
        set_query_param(&mut redirect, QUERY_PROGRAMMATIC_TOKEN, &token);
    }
    let jar = state.sessions.save(jar, token);
    Ok((jar, Redirect::to(redirect.as_str())).into_response())
}
