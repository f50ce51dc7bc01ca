//! Process-wide state and hot-reloadable snapshots.
//!
//! `AuthenticateState` is immutable once built. `Authenticate` holds the
//! current snapshot; a reload replaces it wholesale and every request takes
//! exactly one snapshot at entry (see [`attach_snapshot`]).

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use parking_lot::RwLock;
use portcullis_crypto::{Cipher, Jwks, SharedEncoder};
use portcullis_session::{DataBroker, DirectoryClient, IdentityProvider, host_with_port};
use url::Url;

use crate::config::{InvalidConfig, ServerConfig};
use crate::error::AuthenticateError;
use crate::sessions::SessionStore;

/// External collaborators a snapshot is built around.
#[derive(Clone)]
pub struct Collaborators {
    pub provider: Arc<dyn IdentityProvider>,
    pub databroker: Option<Arc<dyn DataBroker>>,
    pub directory: Arc<dyn DirectoryClient>,
}

/// One consistent view of keys, URLs and collaborators.
pub struct AuthenticateState {
    /// Public URL of this service.
    pub authenticate_url: Url,
    /// Key known to every trusted route; signs URLs.
    pub shared_key: Vec<u8>,
    /// Encrypts per-route handoff tokens.
    pub shared_cipher: Cipher,
    /// Encrypts IdP redirect state; never leaves this service.
    pub cookie_cipher: Cipher,
    /// Signs and verifies session JWTs.
    pub encoder: SharedEncoder,
    pub sessions: SessionStore,
    /// Lifetime of new sessions.
    pub session_lifetime: chrono::Duration,
    pub signout_redirect_url: Option<Url>,
    pub provider: Arc<dyn IdentityProvider>,
    pub databroker: Option<Arc<dyn DataBroker>>,
    pub directory: Arc<dyn DirectoryClient>,
    pub jwks: Jwks,
}

impl AuthenticateState {
    /// Derives a snapshot from configuration.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if a key, URL or duration in `config` is
    /// unusable.
    pub fn new(config: &ServerConfig, collaborators: Collaborators) -> Result<Self, InvalidConfig> {
        let shared_key = config.shared_key()?;
        let cookie_key = config.cookie_key()?;
        let shared_cipher = Cipher::new(&shared_key).map_err(|e| InvalidConfig::Key {
            field: "shared_secret",
            reason: e.to_string(),
        })?;
        let cookie_cipher = Cipher::new(&cookie_key).map_err(|e| InvalidConfig::Key {
            field: "cookie_secret",
            reason: e.to_string(),
        })?;
        let encoder = SharedEncoder::new(&shared_key).map_err(|e| InvalidConfig::Key {
            field: "shared_secret",
            reason: e.to_string(),
        })?;
        let signing_key = config.signing_key()?;
        let session_lifetime = config.session_lifetime()?;

        Ok(Self {
            authenticate_url: config.authenticate_url()?,
            shared_key,
            shared_cipher,
            cookie_cipher,
            encoder,
            sessions: SessionStore::new(config.cookie.clone()),
            session_lifetime,
            signout_redirect_url: config.signout_redirect_url()?,
            provider: collaborators.provider,
            databroker: collaborators.databroker,
            directory: collaborators.directory,
            jwks: Jwks::for_key(signing_key.as_ref()),
        })
    }

    /// The storage service client.
    ///
    /// # Errors
    ///
    /// Returns `AuthenticateError::Configuration` if none is configured.
    pub fn databroker(&self) -> Result<&dyn DataBroker, AuthenticateError> {
        self.databroker
            .as_deref()
            .ok_or_else(|| AuthenticateError::Configuration {
                details: "databroker client is not configured".to_string(),
            })
    }

    /// This service's own host, as it appears in session audiences.
    #[must_use]
    pub fn authenticate_host(&self) -> String {
        host_with_port(&self.authenticate_url)
    }
}

/// Holder of the current snapshot.
pub struct Authenticate {
    current: RwLock<Arc<AuthenticateState>>,
}

impl Authenticate {
    #[must_use]
    pub fn new(state: AuthenticateState) -> Self {
        Self {
            current: RwLock::new(Arc::new(state)),
        }
    }

    /// The current snapshot.
    #[must_use]
    pub fn load(&self) -> Arc<AuthenticateState> {
        Arc::clone(&self.current.read())
    }

    /// Replaces the snapshot. Requests already holding the old one keep it.
    pub fn store(&self, state: AuthenticateState) {
        *self.current.write() = Arc::new(state);
    }
}

/// Middleware that pins the current snapshot to the request.
///
/// Handlers and inner middleware read it with
/// `Extension<Arc<AuthenticateState>>`.
pub async fn attach_snapshot(
    State(authenticate): State<Arc<Authenticate>>,
    mut request: Request,
    next: Next,
) -> Response {
    request.extensions_mut().insert(authenticate.load());
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeProvider, config};
    use portcullis_session::{DisabledDirectory, InMemoryDataBroker};

    fn collaborators() -> Collaborators {
        Collaborators {
            provider: Arc::new(FakeProvider::default()),
            databroker: Some(Arc::new(InMemoryDataBroker::new())),
            directory: Arc::new(DisabledDirectory),
        }
    }

    #[test]
    fn snapshot_takes_lifetime_from_config() {
        let mut config = config();
        config.cookie.expire_minutes = 30;
        let state = AuthenticateState::new(&config, collaborators()).expect("valid state");
        assert_eq!(state.session_lifetime, chrono::Duration::minutes(30));
        assert_eq!(state.authenticate_host(), "authenticate.example.com");
    }

    #[test]
    fn non_positive_session_lifetime_is_rejected() {
        let mut config = config();
        for minutes in [0, -5] {
            config.cookie.expire_minutes = minutes;
            let err = AuthenticateState::new(&config, collaborators())
                .err()
                .expect("rejected");
            assert_eq!(
                err,
                InvalidConfig::NotPositive {
                    field: "cookie.expire_minutes"
                }
            );
        }
    }
}
