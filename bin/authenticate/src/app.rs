//! HTTP routing.

use std::sync::Arc;

use axum::{Router, middleware, routing::get};
use tower_http::trace::TraceLayer;

use crate::authenticate::{self, verify_session};
use crate::signature::{require_signature, require_signature_on_redirect};
use crate::state::{Authenticate, attach_snapshot};
use crate::urls::{
    CALLBACK_PATH, DASHBOARD_PATH, JWKS_PATH, OAUTH_CALLBACK_PATH, SIGN_IN_PATH, SIGN_OUT_PATH,
};

/// Builds the authenticate router.
///
/// | Path | Guards |
/// |---|---|
/// | `/oauth2/callback` | none |
/// | `/.pomerium/` | session, signature when redirecting |
/// | `/.pomerium/sign_in` | session, signature |
/// | `/.pomerium/sign_out` | signature when redirecting |
/// | `/.pomerium/callback/` | signature |
/// | `/.well-known/pomerium/jwks.json` | none |
///
/// Later layers run first, so session verification wraps the signature
/// check.
pub fn router(authenticate: Arc<Authenticate>) -> Router {
    Router::new()
        .route("/", get(authenticate::root))
        .route(OAUTH_CALLBACK_PATH, get(authenticate::oauth_callback))
        .route(
            DASHBOARD_PATH,
            get(authenticate::dashboard)
                .layer(middleware::from_fn(require_signature_on_redirect))
                .layer(middleware::from_fn(verify_session)),
        )
        .route(
            SIGN_IN_PATH,
            get(authenticate::sign_in)
                .post(authenticate::sign_in)
                .layer(middleware::from_fn(require_signature))
                .layer(middleware::from_fn(verify_session)),
        )
        .route(
            SIGN_OUT_PATH,
            get(authenticate::sign_out)
                .post(authenticate::sign_out)
                .layer(middleware::from_fn(require_signature_on_redirect)),
        )
        .route(
            CALLBACK_PATH,
            get(authenticate::route_callback).layer(middleware::from_fn(require_signature)),
        )
        .route(JWKS_PATH, get(authenticate::jwks))
        .layer(middleware::from_fn_with_state(
            Arc::clone(&authenticate),
            attach_snapshot,
        ))
        .layer(TraceLayer::new_for_http())
}
