//! HTTP-facing errors for the authenticate service.
//!
//! Every handler returns `AuthenticateError`, which renders as a JSON body
//! `{"error": ..., "status": ...}` with a user-safe message. Details that
//! could help an attacker (which state check failed, storage errors) are
//! logged, never returned.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use portcullis_session::StateError;
use serde::Serialize;
use std::fmt;

/// Errors surfaced by the authenticate endpoints.
#[derive(Debug)]
pub enum AuthenticateError {
    /// A required parameter is missing or malformed.
    InvalidRequest { reason: String },
    /// The identity provider reported an error on the callback.
    IdentityProvider { code: String },
    /// The IdP state or a handoff token failed validation.
    InvalidState(StateError),
    /// The callback carried no authorization code.
    MissingCode,
    /// The authorization code could not be exchanged.
    Exchange { details: String },
    /// The identity provider could not enrich the user record.
    UserInfo { details: String },
    /// The request URL signature is missing, invalid or expired.
    InvalidSignature,
    /// The caller has no valid session and cannot be redirected.
    Unauthorized { reason: String },
    /// The storage service failed.
    Storage { details: String },
    /// The service is deployed without a required collaborator.
    Configuration { details: String },
    /// Anything else that should not happen.
    Internal { details: String },
}

impl AuthenticateError {
    /// The status code sent to the client.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidRequest { .. }
            | Self::InvalidState(_)
            | Self::MissingCode
            | Self::InvalidSignature => StatusCode::BAD_REQUEST,
            Self::IdentityProvider { code } => match code.as_str() {
                "access_denied" | "unauthorized_client" => StatusCode::UNAUTHORIZED,
                _ => StatusCode::BAD_REQUEST,
            },
            Self::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            Self::Exchange { .. }
            | Self::UserInfo { .. }
            | Self::Storage { .. }
            | Self::Configuration { .. }
            | Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The message sent to the client.
    fn public_message(&self) -> String {
        match self {
            Self::InvalidRequest { reason } => format!("invalid request: {reason}"),
            Self::IdentityProvider { code } => format!("identity provider error: {code}"),
            Self::InvalidState(_) => "invalid state".to_string(),
            Self::MissingCode => "missing authorization code".to_string(),
            Self::Exchange { .. } => "authentication failed".to_string(),
            Self::UserInfo { .. } => "failed to retrieve user info".to_string(),
            Self::InvalidSignature => "invalid signature".to_string(),
            Self::Unauthorized { .. } => "unauthorized".to_string(),
            Self::Storage { .. } | Self::Configuration { .. } | Self::Internal { .. } => {
                "internal server error".to_string()
            }
        }
    }
}

impl fmt::Display for AuthenticateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidRequest { reason } => write!(f, "invalid request: {reason}"),
            Self::IdentityProvider { code } => write!(f, "identity provider error: {code}"),
            Self::InvalidState(e) => write!(f, "invalid state: {e}"),
            Self::MissingCode => write!(f, "missing authorization code"),
            Self::Exchange { details } => write!(f, "code exchange failed: {details}"),
            Self::UserInfo { details } => write!(f, "error retrieving user info: {details}"),
            Self::InvalidSignature => write!(f, "invalid request signature"),
            Self::Unauthorized { reason } => write!(f, "unauthorized: {reason}"),
            Self::Storage { details } => write!(f, "databroker error: {details}"),
            Self::Configuration { details } => write!(f, "configuration error: {details}"),
            Self::Internal { details } => write!(f, "internal error: {details}"),
        }
    }
}

impl std::error::Error for AuthenticateError {}

impl From<StateError> for AuthenticateError {
    fn from(err: StateError) -> Self {
        Self::InvalidState(err)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    status: u16,
}

impl IntoResponse for AuthenticateError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::info!(error = %self, status = status.as_u16(), "request rejected");
        }

        let body = ErrorBody {
            error: self.public_message(),
            status: status.as_u16(),
        };
        (status, Json(body)).into_response()
    }
}
