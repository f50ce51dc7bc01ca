//! OpenID Connect identity provider using the openidconnect crate.

use async_trait::async_trait;
use base64::Engine;
use chrono::Utc;
use openidconnect::core::{CoreAuthenticationFlow, CoreClient, CoreProviderMetadata};
use openidconnect::{
    AuthorizationCode, ClientId, ClientSecret, CsrfToken, IssuerUrl, Nonce, OAuth2TokenResponse,
    RedirectUrl, Scope, TokenResponse,
};
use portcullis_session::{
    FlattenedClaims, IdentityClaims, IdentityProvider, IdentityProviderError, OAuthToken,
    OidcConfig, User,
};
use rootcause::prelude::Report;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::instrument;
use url::Url;

/// Discovery fields the openidconnect core metadata does not expose.
#[derive(Debug, Default, Deserialize)]
struct SessionEndpoints {
    #[serde(default)]
    end_session_endpoint: Option<String>,
    #[serde(default)]
    revocation_endpoint: Option<String>,
    #[serde(default)]
    userinfo_endpoint: Option<String>,
}

/// An identity provider reached through OIDC discovery.
pub struct OidcProvider {
    provider_metadata: CoreProviderMetadata,
    client_id: ClientId,
    client_secret: ClientSecret,
    redirect_url: RedirectUrl,
    http_client: reqwest::Client,
    end_session_endpoint: Option<Url>,
    revocation_endpoint: Option<Url>,
    userinfo_endpoint: Option<Url>,
    config: OidcConfig,
}

impl OidcProvider {
    /// Creates a provider by discovering the issuer's metadata.
    ///
    /// # Errors
    ///
    /// Returns `IdentityProviderError::Configuration` for invalid URLs and
    /// `IdentityProviderError::Discovery` if the metadata cannot be fetched.
    pub async fn discover(config: OidcConfig) -> Result<Self, Report<IdentityProviderError>> {
        let issuer_url = IssuerUrl::new(config.issuer_url().to_string()).map_err(|e| {
            IdentityProviderError::Configuration {
                details: format!("invalid issuer URL: {e}"),
            }
        })?;

        let http_client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| IdentityProviderError::Configuration {
                details: format!("failed to create HTTP client: {e}"),
            })?;

        let provider_metadata = CoreProviderMetadata::discover_async(issuer_url, &http_client)
            .await
            .map_err(|e| IdentityProviderError::Discovery {
                details: format!("failed to discover provider: {e}"),
            })?;

        let endpoints = fetch_session_endpoints(&http_client, config.issuer_url()).await?;

        let redirect_url = RedirectUrl::new(config.redirect_uri().to_string()).map_err(|e| {
            IdentityProviderError::Configuration {
                details: format!("invalid redirect URI: {e}"),
            }
        })?;

        Ok(Self {
            provider_metadata,
            client_id: ClientId::new(config.client_id().to_string()),
            client_secret: ClientSecret::new(config.client_secret().to_string()),
            redirect_url,
            http_client,
            end_session_endpoint: parse_endpoint(endpoints.end_session_endpoint),
            revocation_endpoint: parse_endpoint(endpoints.revocation_endpoint),
            userinfo_endpoint: parse_endpoint(endpoints.userinfo_endpoint),
            config,
        })
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &OidcConfig {
        &self.config
    }
}

async fn fetch_session_endpoints(
    http_client: &reqwest::Client,
    issuer_url: &str,
) -> Result<SessionEndpoints, Report<IdentityProviderError>> {
    let url = format!(
        "{}/.well-known/openid-configuration",
        issuer_url.trim_end_matches('/')
    );
    let endpoints = http_client
        .get(&url)
        .send()
        .await
        .and_then(reqwest::Response::error_for_status)
        .map_err(|e| IdentityProviderError::Discovery {
            details: format!("failed to fetch {url}: {e}"),
        })?
        .json::<SessionEndpoints>()
        .await
        .map_err(|e| IdentityProviderError::Discovery {
            details: format!("failed to parse {url}: {e}"),
        })?;
    Ok(endpoints)
}

fn parse_endpoint(raw: Option<String>) -> Option<Url> {
    raw.filter(|s| !s.is_empty())
        .and_then(|s| Url::parse(&s).ok())
}

#[async_trait]
impl IdentityProvider for OidcProvider {
    fn name(&self) -> &str {
        self.config.provider_name()
    }

    fn authorization_url(&self, state: &str) -> Result<Url, Report<IdentityProviderError>> {
        let client = CoreClient::from_provider_metadata(
            self.provider_metadata.clone(),
            self.client_id.clone(),
            Some(self.client_secret.clone()),
        )
        .set_redirect_uri(self.redirect_url.clone());

        let state = state.to_string();
        let mut auth_request = client.authorize_url(
            CoreAuthenticationFlow::AuthorizationCode,
            move || CsrfToken::new(state),
            Nonce::new_random,
        );
        for scope in self.config.scopes() {
            auth_request = auth_request.add_scope(Scope::new(scope.to_string()));
        }
        let (auth_url, _, _) = auth_request.url();

        Url::parse(auth_url.as_str()).map_err(|e| {
            IdentityProviderError::Configuration {
                details: format!("invalid authorization url: {e}"),
            }
            .into()
        })
    }

    #[instrument(skip_all, fields(provider = self.config.provider_name()))]
    async fn authenticate(
        &self,
        code: &str,
    ) -> Result<(OAuthToken, IdentityClaims), Report<IdentityProviderError>> {
        let client = CoreClient::from_provider_metadata(
            self.provider_metadata.clone(),
            self.client_id.clone(),
            Some(self.client_secret.clone()),
        )
        .set_redirect_uri(self.redirect_url.clone());

        let token_request = client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .map_err(|e| IdentityProviderError::Exchange {
                details: format!("token endpoint error: {e}"),
            })?;

        let token_response = token_request
            .request_async(&self.http_client)
            .await
            .map_err(|e| IdentityProviderError::Exchange {
                details: format!("token exchange failed: {e}"),
            })?;

        let id_token = token_response
            .id_token()
            .ok_or_else(|| IdentityProviderError::Exchange {
                details: "no ID token in response".to_string(),
            })?;

        // The redirect state carries no nonce, so only signature, issuer,
        // audience and expiry are checked.
        let skip_nonce = |_: Option<&Nonce>| -> Result<(), String> { Ok(()) };
        id_token
            .claims(&client.id_token_verifier(), skip_nonce)
            .map_err(|e| IdentityProviderError::TokenValidation {
                details: format!("ID token validation failed: {e}"),
            })?;

        let raw_id_token = raw_id_token(&token_response)?;
        let claims = decode_payload(&raw_id_token)?;

        let oauth_token = OAuthToken {
            access_token: token_response.access_token().secret().clone(),
            refresh_token: token_response.refresh_token().map(|t| t.secret().clone()),
            token_type: "Bearer".to_string(),
            expires_at: token_response
                .expires_in()
                .and_then(|d| chrono::Duration::from_std(d).ok())
                .map(|d| Utc::now() + d),
        };

        Ok((oauth_token, IdentityClaims::new(raw_id_token, claims)))
    }

    #[instrument(skip_all, fields(provider = self.config.provider_name()))]
    async fn revoke(&self, token: &OAuthToken) -> Result<(), Report<IdentityProviderError>> {
        let Some(endpoint) = &self.revocation_endpoint else {
            tracing::debug!("provider has no revocation endpoint");
            return Ok(());
        };

        self.http_client
            .post(endpoint.clone())
            .basic_auth(self.client_id.as_str(), Some(self.client_secret.secret()))
            .form(&[
                ("token", token.access_token.as_str()),
                ("token_type_hint", "access_token"),
            ])
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| IdentityProviderError::Revocation {
                details: e.to_string(),
            })?;
        Ok(())
    }

    fn end_session_url(&self) -> Result<Url, IdentityProviderError> {
        self.end_session_endpoint
            .clone()
            .ok_or(IdentityProviderError::SignOutNotImplemented)
    }

    #[instrument(skip_all, fields(provider = self.config.provider_name(), user_id = %user.id))]
    async fn update_user_info(
        &self,
        token: &OAuthToken,
        user: &mut User,
    ) -> Result<(), Report<IdentityProviderError>> {
        let Some(endpoint) = &self.userinfo_endpoint else {
            return Ok(());
        };

        let info = self
            .http_client
            .get(endpoint.clone())
            .bearer_auth(&token.access_token)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| IdentityProviderError::UserInfo {
                details: e.to_string(),
            })?
            .json::<Map<String, Value>>()
            .await
            .map_err(|e| IdentityProviderError::UserInfo {
                details: format!("invalid userinfo response: {e}"),
            })?;

        apply_user_info(user, &info);
        Ok(())
    }
}

/// Copies profile fields from a userinfo response onto `user`.
fn apply_user_info(user: &mut User, info: &Map<String, Value>) {
    if let Some(email) = info.get("email").and_then(Value::as_str) {
        user.email = Some(email.to_string());
    }
    if let Some(name) = info
        .get("name")
        .or_else(|| info.get("preferred_username"))
        .and_then(Value::as_str)
    {
        user.name = Some(name.to_string());
    }
    let mut claims = FlattenedClaims::from_map(info);
    claims.merge(std::mem::take(&mut user.claims));
    user.claims = claims;
}

/// Extracts the signed ID token from a token response.
///
/// openidconnect exposes only parsed claims, so the response is serialized
/// to recover the original string.
fn raw_id_token<TR>(token_response: &TR) -> Result<String, Report<IdentityProviderError>>
where
    TR: serde::Serialize,
{
    let response_json = serde_json::to_value(token_response).map_err(|e| {
        IdentityProviderError::TokenValidation {
            details: format!("failed to serialize token response: {e}"),
        }
    })?;

    let id_token = response_json
        .get("id_token")
        .and_then(Value::as_str)
        .ok_or_else(|| IdentityProviderError::TokenValidation {
            details: "no id_token in response".to_string(),
        })?;
    Ok(id_token.to_string())
}

/// Decodes the claims of an already verified JWT.
fn decode_payload(jwt: &str) -> Result<Map<String, Value>, Report<IdentityProviderError>> {
    // JWT is base64url(header).base64url(payload).signature
    let parts: Vec<&str> = jwt.split('.').collect();
    if parts.len() != 3 {
        return Err(IdentityProviderError::TokenValidation {
            details: "invalid JWT format".to_string(),
        }
        .into());
    }

    let payload_bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(parts[1].trim_end_matches('='))
        .map_err(|e| IdentityProviderError::TokenValidation {
            details: format!("failed to decode JWT payload: {e}"),
        })?;

    let payload: Map<String, Value> = serde_json::from_slice(&payload_bytes).map_err(|e| {
        IdentityProviderError::TokenValidation {
            details: format!("failed to parse JWT payload: {e}"),
        }
    })?;
    Ok(payload)
}
