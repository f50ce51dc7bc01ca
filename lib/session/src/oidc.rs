//! OIDC (OpenID Connect) configuration.
//!
//! This module provides configuration types for connecting to an external
//! OIDC identity provider for user authentication.

use serde::{Deserialize, Serialize};

/// Configuration for the OIDC identity provider.
///
/// Fields with defaults can be omitted when loading from environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OidcConfig {
    /// The OIDC issuer URL (e.g., "https://idp.example.com/realms/main").
    /// Used for OIDC discovery.
    issuer_url: String,
    /// The OAuth2 client ID registered with the provider.
    client_id: String,
    /// The OAuth2 client secret.
    client_secret: String,
    /// The redirect URI for the OAuth2 callback
    /// (e.g., "https://authenticate.example.com/oauth2/callback").
    redirect_uri: String,
    /// OAuth2 scopes to request as a comma-separated string.
    /// Default: "openid,email,profile,offline_access"
    #[serde(default = "default_scopes")]
    scopes: String,
    /// Short name for the provider, recorded in logs.
    /// Default: "oidc"
    #[serde(default = "default_provider_name")]
    provider_name: String,
}

fn default_scopes() -> String {
    "openid,email,profile,offline_access".to_string()
}

fn default_provider_name() -> String {
    "oidc".to_string()
}

impl OidcConfig {
    /// Creates a new OIDC configuration with defaults for optional fields.
    #[must_use]
    pub fn new(
        issuer_url: String,
        client_id: String,
        client_secret: String,
        redirect_uri: String,
    ) -> Self {
        Self {
            issuer_url,
            client_id,
            client_secret,
            redirect_uri,
            scopes: default_scopes(),
            provider_name: default_provider_name(),
        }
    }

    /// Returns the OIDC issuer URL.
    #[must_use]
    pub fn issuer_url(&self) -> &str {
        &self.issuer_url
    }

    /// Returns the OAuth2 client ID.
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Returns the OAuth2 client secret.
    #[must_use]
    pub fn client_secret(&self) -> &str {
        &self.client_secret
    }

    /// Returns the OAuth2 redirect URI.
    #[must_use]
    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    /// Returns the OAuth2 scopes to request, parsed from comma-separated string.
    #[must_use]
    pub fn scopes(&self) -> Vec<&str> {
        self.scopes
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// Returns the provider name.
    #[must_use]
    pub fn provider_name(&self) -> &str {
        &self.provider_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_config_has_defaults() {
        let config = OidcConfig::new(
            "https://idp.example.com".to_string(),
            "client-id".to_string(),
            "client-secret".to_string(),
            "https://authenticate.example.com/oauth2/callback".to_string(),
        );

        assert_eq!(config.issuer_url(), "https://idp.example.com");
        assert_eq!(config.client_id(), "client-id");
        assert_eq!(config.client_secret(), "client-secret");
        assert_eq!(
            config.redirect_uri(),
            "https://authenticate.example.com/oauth2/callback"
        );
        assert!(config.scopes().contains(&"openid"));
        assert!(config.scopes().contains(&"offline_access"));
        assert_eq!(config.provider_name(), "oidc");
    }

    #[test]
    fn config_deserializes_with_defaults() {
        let json = r#"{
            "issuer_url": "https://idp.example.com",
            "client_id": "my-client",
            "client_secret": "secret",
            "redirect_uri": "https://authenticate.example.com/oauth2/callback"
        }"#;

        let config: OidcConfig = serde_json::from_str(json).expect("deserialize");

        assert_eq!(config.client_id(), "my-client");
        assert_eq!(
            config.scopes(),
            vec!["openid", "email", "profile", "offline_access"]
        );
        assert_eq!(config.provider_name(), "oidc");
    }

    #[test]
    fn scopes_parses_comma_separated() {
        let json = r#"{
            "issuer_url": "https://idp.example.com",
            "client_id": "my-client",
            "client_secret": "secret",
            "redirect_uri": "https://authenticate.example.com/oauth2/callback",
            "scopes": "openid, email, ,groups"
        }"#;

        let config: OidcConfig = serde_json::from_str(json).expect("deserialize");

        assert_eq!(config.scopes(), vec!["openid", "email", "groups"]);
    }
}
