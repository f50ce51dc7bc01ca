//! Sign-out and server-side revocation.

use std::sync::Arc;

use axum::{
    Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::CookieJar;
use portcullis_core::SessionId;
use portcullis_session::{DataBrokerError, IdentityProviderError, Session, databroker};
use rootcause::prelude::Report;
use url::Url;

use crate::state::AuthenticateState;
use crate::urls::{FormValues, redirect_uri};

/// What sign-out undid server-side.
///
/// Both results are best-effort: they are logged and never change the
/// response, since the local session is already cleared.
pub struct Revocation {
    pub session_id: SessionId,
    /// The provider's raw ID token, used as the end-session hint.
    pub raw_id_token: Option<String>,
    /// `None` when the session held no provider token to revoke.
    pub revoke: Option<Result<(), Report<IdentityProviderError>>>,
    pub delete: Result<(), Report<DataBrokerError>>,
}

impl Revocation {
    /// Logs the best-effort failures.
    pub fn log(&self) {
        if let Some(Err(e)) = &self.revoke {
            tracing::warn!(
                error = %e,
                session_id = %self.session_id,
                "failed to revoke access token"
            );
        }
        if let Err(e) = &self.delete {
            tracing::warn!(error = %e, session_id = %self.session_id, "failed to delete session");
        }
    }
}

/// Clears the local session, revokes the server session and sends the user
/// to the provider's end-session endpoint when it has one.
pub async fn sign_out(
    Extension(state): Extension<Arc<AuthenticateState>>,
    headers: HeaderMap,
    values: FormValues,
) -> Response {
    let request_jar = CookieJar::from_headers(&headers);
    let jar = state.sessions.clear(request_jar.clone());

    let revocation = revoke_session(&state, &headers).await;
    if let Some(revocation) = &revocation {
        revocation.log();
    }
    let raw_id_token = revocation.and_then(|r| r.raw_id_token).unwrap_or_default();

    let target =
        redirect_uri(&values, &request_jar).or_else(|| state.signout_redirect_url.clone());
    let Some(target) = target else {
        return (jar, (StatusCode::OK, "user logged out")).into_response();
    };

    let location = match state.provider.end_session_url() {
        Ok(end_session) => end_session_redirect(end_session, &raw_id_token, &target),
        Err(IdentityProviderError::SignOutNotImplemented) => target,
        Err(e) => {
            tracing::warn!(error = %e, "failed to get end session url");
            target
        }
    };
    (jar, Redirect::to(location.as_str())).into_response()
}

fn end_session_redirect(mut end_session: Url, raw_id_token: &str, target: &Url) -> Url {
    {
        let mut params = end_session.query_pairs_mut();
        params.clear();
        if !raw_id_token.is_empty() {
            params.append_pair("id_token_hint", raw_id_token);
        }
        params.append_pair("post_logout_redirect_uri", target.as_str());
    }
    end_session
}

/// Deletes the caller's server session after revoking its provider token.
///
/// Returns `None` when the request carries no verifiable session or no
/// storage service is configured.
pub async fn revoke_session(state: &AuthenticateState, headers: &HeaderMap) -> Option<Revocation> {
    let loaded = state.sessions.load_verified(headers, &state.encoder).ok()?;
    let broker = match state.databroker() {
        Ok(broker) => broker,
        Err(e) => {
            tracing::error!(error = %e, "cannot revoke session");
            return None;
        }
    };
    let session_id = loaded.claims.id;

    let record = databroker::get::<Session>(broker, session_id.as_str())
        .await
        .ok()
        .flatten();
    let raw_id_token = record
        .as_ref()
        .map(|s| s.id_token.raw.clone())
        .filter(|raw| !raw.is_empty());

    let revoke = match record.as_ref().and_then(|s| s.oauth_token.as_ref()) {
        Some(token) => Some(state.provider.revoke(token).await),
        None => None,
    };
    let delete = databroker::delete::<Session>(broker, session_id.as_str()).await;

    Some(Revocation {
        session_id,
        raw_id_token,
        revoke,
        delete,
    })
}
