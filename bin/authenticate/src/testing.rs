//! Fakes and helpers for router tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{HeaderMap, Request, Response, header},
};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use portcullis_core::UserId;
use portcullis_session::{
    DataBroker, DataBrokerError, DirectoryClient, DirectoryError, IdentityClaims,
    IdentityProvider, IdentityProviderError, InMemoryDataBroker, OAuthToken, StoredRecord, User,
};
use rootcause::prelude::Report;
use serde_json::json;
use tower::ServiceExt;
use url::Url;

use crate::app;
use crate::config::ServerConfig;
use crate::state::{Authenticate, AuthenticateState, Collaborators};

pub const AUTHENTICATE_URL: &str = "https://authenticate.example.com";
pub const GOOD_CODE: &str = "good-code";
pub const RAW_ID_TOKEN: &str = "header.payload.signature";

/// An identity provider that accepts [`GOOD_CODE`] for `user-1`.
#[derive(Debug, Default)]
pub struct FakeProvider {
    pub end_session: Option<Url>,
    pub revoked: Mutex<Vec<String>>,
}

#[async_trait]
impl IdentityProvider for FakeProvider {
    fn name(&self) -> &str {
        "fake"
    }

    fn authorization_url(&self, state: &str) -> Result<Url, Report<IdentityProviderError>> {
        let mut url = Url::parse("https://idp.example.com/authorize").map_err(|e| {
            IdentityProviderError::Configuration {
                details: e.to_string(),
            }
        })?;
        url.query_pairs_mut().append_pair("state", state);
        Ok(url)
    }

    async fn authenticate(
        &self,
        code: &str,
    ) -> Result<(OAuthToken, IdentityClaims), Report<IdentityProviderError>> {
        if code != GOOD_CODE {
            return Err(IdentityProviderError::Exchange {
                details: "invalid_grant".to_string(),
            }
            .into());
        }
        let claims = json!({
            "iss": "https://idp.example.com",
            "sub": "user-1",
            "email": "alice@example.com",
            "name": "Alice",
            "groups": ["admins", "staff"],
        });
        let claims = match claims {
            serde_json::Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        Ok((
            OAuthToken::bearer("access-token"),
            IdentityClaims::new(RAW_ID_TOKEN.to_string(), claims),
        ))
    }

    async fn revoke(&self, token: &OAuthToken) -> Result<(), Report<IdentityProviderError>> {
        self.revoked.lock().push(token.access_token.clone());
        Ok(())
    }

    fn end_session_url(&self) -> Result<Url, IdentityProviderError> {
        self.end_session
            .clone()
            .ok_or(IdentityProviderError::SignOutNotImplemented)
    }

    async fn update_user_info(
        &self,
        _token: &OAuthToken,
        user: &mut User,
    ) -> Result<(), Report<IdentityProviderError>> {
        user.name = Some("Alice Example".to_string());
        Ok(())
    }
}

/// Records refresh requests and optionally fails them.
#[derive(Debug, Default)]
pub struct RecordingDirectory {
    pub fail: AtomicBool,
    pub refreshed: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl DirectoryClient for RecordingDirectory {
    async fn refresh_user(
        &self,
        user_id: &UserId,
        access_token: &str,
    ) -> Result<(), Report<DirectoryError>> {
        self.refreshed
            .lock()
            .push((user_id.to_string(), access_token.to_string()));
        if self.fail.load(Ordering::SeqCst) {
            return Err(DirectoryError::Rejected { status: 503 }.into());
        }
        Ok(())
    }
}

/// A storage service that fails every call.
#[derive(Debug, Default)]
pub struct UnavailableDataBroker;

impl UnavailableDataBroker {
    fn error() -> Report<DataBrokerError> {
        DataBrokerError::Unavailable {
            details: "connection refused".to_string(),
        }
        .into()
    }
}

#[async_trait]
impl DataBroker for UnavailableDataBroker {
    async fn get(
        &self,
        _record_type: &str,
        _id: &str,
    ) -> Result<Option<StoredRecord>, Report<DataBrokerError>> {
        Err(Self::error())
    }

    async fn put(
        &self,
        _record_type: &str,
        _id: &str,
        _data: serde_json::Value,
    ) -> Result<u64, Report<DataBrokerError>> {
        Err(Self::error())
    }

    async fn delete(&self, _record_type: &str, _id: &str) -> Result<(), Report<DataBrokerError>> {
        Err(Self::error())
    }

    async fn delete_expired_sessions(
        &self,
        _now: DateTime<Utc>,
    ) -> Result<u64, Report<DataBrokerError>> {
        Err(Self::error())
    }
}

pub fn config() -> ServerConfig {
    serde_json::from_value(json!({
        "authenticate_url": AUTHENTICATE_URL,
        "shared_secret": "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=",
        "cookie_secret": "AQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQE=",
        "signing_key": "AgICAgICAgICAgICAgICAgICAgICAgICAgICAgICAgI=",
        "oidc": {
            "issuer_url": "https://idp.example.com",
            "client_id": "client",
            "client_secret": "secret",
            "redirect_uri": "https://authenticate.example.com/oauth2/callback"
        }
    }))
    .expect("deserialize config")
}

/// A router wired to fakes, with handles on each fake.
pub struct Harness {
    pub router: Router,
    pub authenticate: Arc<Authenticate>,
    pub broker: Arc<InMemoryDataBroker>,
    pub provider: Arc<FakeProvider>,
    pub directory: Arc<RecordingDirectory>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_provider(FakeProvider::default())
    }

    pub fn with_provider(provider: FakeProvider) -> Self {
        Self::build(config(), provider, true)
    }

    pub fn without_databroker() -> Self {
        Self::build(config(), FakeProvider::default(), false)
    }

    fn build(config: ServerConfig, provider: FakeProvider, with_broker: bool) -> Self {
        let broker = Arc::new(InMemoryDataBroker::new());
        let provider = Arc::new(provider);
        let directory = Arc::new(RecordingDirectory::default());
        let databroker: Option<Arc<dyn DataBroker>> = if with_broker {
            Some(Arc::clone(&broker) as Arc<dyn DataBroker>)
        } else {
            None
        };
        let state = AuthenticateState::new(
            &config,
            Collaborators {
                provider: Arc::clone(&provider) as Arc<dyn IdentityProvider>,
                databroker,
                directory: Arc::clone(&directory) as Arc<dyn DirectoryClient>,
            },
        )
        .expect("valid state");
        let authenticate = Arc::new(Authenticate::new(state));
        Self {
            router: app::router(Arc::clone(&authenticate)),
            authenticate,
            broker,
            provider,
            directory,
        }
    }

    /// Swaps in a snapshot backed by `databroker`, keeping the other fakes.
    pub fn replace_databroker(&self, databroker: Arc<dyn DataBroker>) {
        let state = AuthenticateState::new(
            &config(),
            Collaborators {
                provider: Arc::clone(&self.provider) as Arc<dyn IdentityProvider>,
                databroker: Some(databroker),
                directory: Arc::clone(&self.directory) as Arc<dyn DirectoryClient>,
            },
        )
        .expect("valid state");
        self.authenticate.store(state);
    }

    pub fn state(&self) -> Arc<AuthenticateState> {
        self.authenticate.load()
    }

    /// Signs `url` with the shared key.
    pub fn sign(&self, url: &str) -> String {
        let url = Url::parse(url).expect("valid url");
        portcullis_crypto::sign_url(&self.state().shared_key, &url)
            .expect("sign")
            .to_string()
    }

    pub async fn get(&self, uri: &str, headers: &[(&str, &str)]) -> Response<Body> {
        let mut request = Request::builder().uri(uri);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }
        self.send(request.body(Body::empty()).expect("request")).await
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible")
    }

    /// Runs the sign-in flow through the provider and returns the session
    /// cookie value.
    pub async fn sign_in_user(&self) -> String {
        let sign_in = self.sign(&format!(
            "{AUTHENTICATE_URL}/.pomerium/sign_in?pomerium_redirect_uri=https%3A%2F%2Fapp.example.com%2F"
        ));
        let response = self.get(&sign_in, &[]).await;
        let state = query_value(&location(&response), "state").expect("state");

        let callback = format!(
            "{AUTHENTICATE_URL}/oauth2/callback?code={GOOD_CODE}&state={}",
            urlencode(&state)
        );
        let response = self.get(&callback, &[]).await;
        session_cookie(response.headers()).expect("session cookie")
    }
}

pub fn location(response: &Response<Body>) -> String {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .expect("location header")
        .to_string()
}

pub fn query_value(url: &str, name: &str) -> Option<String> {
    Url::parse(url)
        .ok()?
        .query_pairs()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
}

pub fn urlencode(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

/// The decoded value the response sets for `name`, if any. An empty value
/// means the cookie was cleared.
pub fn set_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    let prefix = format!("{name}=");
    headers
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find_map(|v| v.strip_prefix(&prefix))
        .map(|rest| {
            let raw = rest.split(';').next().unwrap_or_default();
            url::form_urlencoded::parse(raw.as_bytes())
                .map(|(value, _)| value.into_owned())
                .next()
                .unwrap_or_default()
        })
}

pub fn session_cookie(headers: &HeaderMap) -> Option<String> {
    set_cookie(headers, "_pomerium").filter(|v| !v.is_empty())
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json body")
}

pub async fn body_text(response: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    String::from_utf8(bytes.to_vec()).expect("utf-8 body")
}
