//! The session dashboard.

use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::Request,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::{
    CookieJar,
    cookie::{Cookie, SameSite},
};
use chrono::{DateTime, Utc};
use portcullis_core::{SessionId, UserId};
use portcullis_crypto::sign_url;
use portcullis_session::{
    DataBroker, DirectoryGroup, DirectoryUser, FlattenedClaims, Session, SessionView, User,
    databroker,
};
use serde::Serialize;
use url::Url;

use super::verify::VerifiedSession;
use crate::error::AuthenticateError;
use crate::state::AuthenticateState;
use crate::urls::{
    DASHBOARD_PATH, FormValues, MAX_FORM_BYTES, QUERY_REDIRECT_URI, REDIRECT_COOKIE,
    SIGN_OUT_PATH, redirect_uri, resolve_on, set_query_param,
};

/// Server session fields safe to show the user. Tokens are left out.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub id: SessionId,
    pub user_id: UserId,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub audience: Vec<String>,
    pub claims: FlattenedClaims,
}

impl From<&Session> for SessionSummary {
    fn from(session: &Session) -> Self {
        Self {
            id: session.id.clone(),
            user_id: session.user_id.clone(),
            issued_at: session.issued_at,
            expires_at: session.expires_at,
            audience: session.audience.clone(),
            claims: session.claims.clone(),
        }
    }
}

/// Everything the dashboard shows.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardPayload {
    pub session: SessionView,
    pub session_record: Option<SessionSummary>,
    pub user: User,
    pub directory_user: DirectoryUser,
    pub directory_groups: Vec<DirectoryGroup>,
    pub sign_out_url: String,
}

/// Shows the caller's session, user and directory data.
///
/// A request carrying a redirect target stores it in a cookie and reloads
/// the dashboard without it, so the target outlives the URL signature.
pub async fn dashboard(
    Extension(state): Extension<Arc<AuthenticateState>>,
    Extension(session): Extension<VerifiedSession>,
    request: Request,
) -> Result<Response, AuthenticateError> {
    let (parts, body) = request.into_parts();
    let body = axum::body::to_bytes(body, MAX_FORM_BYTES)
        .await
        .map_err(|e| AuthenticateError::InvalidRequest {
            reason: format!("failed to read body: {e}"),
        })?;
    let values = FormValues::parse(&parts.uri, &parts.headers, &body);
    let jar = CookieJar::from_headers(&parts.headers);

    if let Some(target) = values.get(QUERY_REDIRECT_URI) {
        let mut dashboard = resolve_on(&state.authenticate_url, &parts.uri);
        dashboard.set_query(None);
        let cookie = Cookie::build((REDIRECT_COOKIE, target.to_string()))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax);
        return Ok((jar.add(cookie), Redirect::to(dashboard.as_str())).into_response());
    }

    let broker = state.databroker()?;
    let (view, record) = current_session(broker, &session).await;
    let user_id = record
        .as_ref()
        .map_or_else(|| session.claims.user_id(), |r| r.user_id.clone());

    let user = databroker::get::<User>(broker, user_id.as_str())
        .await
        .ok()
        .flatten()
        .unwrap_or_else(|| User::new(user_id.clone()));
    let directory_user = databroker::get::<DirectoryUser>(broker, user_id.as_str())
        .await
        .ok()
        .flatten()
        .unwrap_or_else(|| DirectoryUser::new(user_id.clone()));

    let mut directory_groups = Vec::with_capacity(directory_user.group_ids.len());
    for group_id in &directory_user.group_ids {
        let group = databroker::get::<DirectoryGroup>(broker, group_id)
            .await
            .ok()
            .flatten()
            .unwrap_or_else(|| DirectoryGroup::placeholder(group_id));
        directory_groups.push(group);
    }

    let sign_out_url = sign_out_url(&state, redirect_uri(&values, &jar).as_ref())?;

    Ok(Json(DashboardPayload {
        session: view,
        session_record: record.as_ref().map(SessionSummary::from),
        user,
        directory_user,
        directory_groups,
        sign_out_url: sign_out_url.to_string(),
    })
    .into_response())
}

/// Resolves the server record for the caller, following an impersonation
/// link if the record has one.
async fn current_session(
    broker: &dyn DataBroker,
    session: &VerifiedSession,
) -> (SessionView, Option<Session>) {
    let own = databroker::get::<Session>(broker, session.claims.id.as_str())
        .await
        .ok()
        .flatten();
    let Some(own) = own else {
        return (
            SessionView::Authenticated {
                claims: session.claims.clone(),
            },
            None,
        );
    };

    let Some(target_id) = own.impersonate_session_id.clone() else {
        return (
            SessionView::Authenticated {
                claims: session.claims.clone(),
            },
            Some(own),
        );
    };

    let target = databroker::get::<Session>(broker, target_id.as_str())
        .await
        .ok()
        .flatten();
    let view = SessionView::Impersonated {
        claims: session.claims.clone(),
        actor_id: own.user_id.clone(),
    };
    (view, target)
}

/// The sign-out endpoint, carrying `redirect` when given, signed with the
/// shared key.
fn sign_out_url(
    state: &AuthenticateState,
    redirect: Option<&Url>,
) -> Result<Url, AuthenticateError> {
    let mut url = state
        .authenticate_url
        .join(SIGN_OUT_PATH)
        .map_err(|e| AuthenticateError::Internal {
            details: format!("invalid sign out url: {e}"),
        })?;
    if let Some(redirect) = redirect {
        set_query_param(&mut url, QUERY_REDIRECT_URI, redirect.as_str());
    }
    sign_url(&state.shared_key, &url).map_err(|e| AuthenticateError::Internal {
        details: format!("failed to sign sign out url: {e}"),
    })
}

/// Sends `/` to the dashboard.
pub async fn root() -> Redirect {
    Redirect::to(DASHBOARD_PATH)
}
