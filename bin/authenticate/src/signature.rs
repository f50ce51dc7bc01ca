//! Request signature middleware.
//!
//! Trusted routes reach the authenticate service through URLs signed with
//! the shared key (see `portcullis_crypto::sign_url`). These layers reject
//! requests whose URL signature is missing, forged or stale.

use std::sync::Arc;

use axum::{
    Extension,
    body::Body,
    extract::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use portcullis_crypto::validate_signed_url;

use crate::error::AuthenticateError;
use crate::state::AuthenticateState;
use crate::urls::{FormValues, MAX_FORM_BYTES, QUERY_REDIRECT_URI, absolute_url};

/// Requires a valid signature on every request.
pub async fn require_signature(
    Extension(state): Extension<Arc<AuthenticateState>>,
    request: Request,
    next: Next,
) -> Response {
    if let Err(err) = check_signature(&state, &request) {
        return err.into_response();
    }
    next.run(request).await
}

/// Requires a valid signature only when the request names a redirect target.
///
/// A form body is buffered to look for the target and handed on unchanged.
pub async fn require_signature_on_redirect(
    Extension(state): Extension<Arc<AuthenticateState>>,
    request: Request,
    next: Next,
) -> Response {
    let (parts, body) = request.into_parts();
    let bytes = match axum::body::to_bytes(body, MAX_FORM_BYTES).await {
        Ok(bytes) => bytes,
        Err(e) => {
            return AuthenticateError::InvalidRequest {
                reason: format!("failed to read body: {e}"),
            }
            .into_response();
        }
    };

    let values = FormValues::parse(&parts.uri, &parts.headers, &bytes);
    let request = Request::from_parts(parts, Body::from(bytes));
    if values.get(QUERY_REDIRECT_URI).is_some() {
        if let Err(err) = check_signature(&state, &request) {
            return err.into_response();
        }
    }
    next.run(request).await
}

fn check_signature(state: &AuthenticateState, request: &Request) -> Result<(), AuthenticateError> {
    let url = absolute_url(&state.authenticate_url, request.uri(), request.headers());
    validate_signed_url(&state.shared_key, &url).map_err(|e| {
        tracing::info!(error = %e, path = url.path(), "rejected request signature");
        AuthenticateError::InvalidSignature
    })
}
