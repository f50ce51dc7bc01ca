//! The authenticate endpoints.
//!
//! # Flow
//!
//! 1. A route sends an unauthenticated user to `/.pomerium/sign_in`.
//!    [`verify_session`] finds no session and redirects to the identity
//!    provider with an encrypted `state` that remembers the original URL.
//! 2. The provider redirects to `/oauth2/callback`. [`oauth_callback`]
//!    exchanges the code, validates `state`, persists the user and session
//!    records and sets the session cookie, then returns the user to the
//!    original URL.
//! 3. `/.pomerium/sign_in` now passes verification. [`sign_in`] re-audiences
//!    the session for the route, encrypts it under the shared key and
//!    redirects to the route's signed `/.pomerium/callback/`.
//! 4. [`route_callback`] decrypts the token, stores it verbatim and
//!    continues to the route.
//!
//! [`sign_out`] clears the cookie first and treats everything after that as
//! best-effort.

pub mod callback;
pub mod dashboard;
pub mod sign_in;
pub mod sign_out;
pub mod verify;

pub use callback::{oauth_callback, route_callback};
pub use dashboard::{dashboard, root};
pub use sign_in::sign_in;
pub use sign_out::sign_out;
pub use verify::{VerifiedSession, verify_session};

use std::sync::Arc;

use axum::{Extension, Json};
use portcullis_crypto::Jwks;

use crate::state::AuthenticateState;

/// Serves the public key set downstream verifiers trust.
pub async fn jwks(Extension(state): Extension<Arc<AuthenticateState>>) -> Json<Jwks> {
    Json(state.jwks.clone())
}
