//! Centralized server configuration.
//!
//! This module provides strongly-typed configuration for the authenticate
//! service, loaded via the `config` crate from environment variables. Nested
//! keys use `__` as the separator (e.g. `COOKIE__NAME`, `OIDC__CLIENT_ID`).
//!
//! See [`OidcConfig`](portcullis_session::OidcConfig) for identity provider
//! configuration.

use std::fmt;

use portcullis_crypto::{CryptoError, SigningKey, decode_base64_key};
use portcullis_session::{OidcConfig, parse_and_validate_url};
use serde::Deserialize;
use url::Url;

/// Server configuration composed from library configs.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address to listen on.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Public URL of this service (e.g. "https://authenticate.example.com").
    pub authenticate_url: String,

    /// Base64 32-byte key shared with every trusted route.
    pub shared_secret: String,

    /// Base64 32-byte key private to this service.
    pub cookie_secret: String,

    /// Base64 Ed25519 seed whose public half is served as the JWKS.
    #[serde(default)]
    pub signing_key: Option<String>,

    /// Where to send users after sign-out when the request names no target.
    #[serde(default)]
    pub signout_redirect_url: Option<String>,

    /// Local session cookie configuration.
    #[serde(default)]
    pub cookie: CookieConfig,

    /// Session maintenance configuration.
    #[serde(default)]
    pub session: SessionConfig,

    /// Storage service configuration.
    #[serde(default)]
    pub databroker: DataBrokerConfig,

    /// Directory service configuration.
    #[serde(default)]
    pub directory: DirectoryConfig,

    /// OIDC authentication configuration.
    pub oidc: OidcConfig,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

/// Local session cookie configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CookieConfig {
    /// Cookie name.
    #[serde(default = "default_cookie_name")]
    pub name: String,

    /// Cookie domain. Host-only when unset.
    #[serde(default)]
    pub domain: Option<String>,

    /// Whether to set the Secure flag on cookies (requires HTTPS).
    /// Defaults to true for production safety; set to false for local HTTP development.
    #[serde(default = "default_true")]
    pub secure: bool,

    /// Whether to set the HttpOnly flag.
    #[serde(default = "default_true")]
    pub http_only: bool,

    /// Lifetime of the cookie and of the server session record, in minutes.
    #[serde(default = "default_cookie_expire_minutes")]
    pub expire_minutes: i64,
}

fn default_cookie_name() -> String {
    "_pomerium".to_string()
}

fn default_true() -> bool {
    true
}

fn default_cookie_expire_minutes() -> i64 {
    14 * 60
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self {
            name: default_cookie_name(),
            domain: None,
            secure: default_true(),
            http_only: default_true(),
            expire_minutes: default_cookie_expire_minutes(),
        }
    }
}

/// Session-related configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Interval between expired session cleanup runs, in seconds.
    #[serde(default = "default_cleanup_interval_seconds")]
    pub cleanup_interval_seconds: u64,
}

fn default_cleanup_interval_seconds() -> u64 {
    300
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cleanup_interval_seconds: default_cleanup_interval_seconds(),
        }
    }
}

/// Which storage backend to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataBrokerBackend {
    /// Process memory. Sessions do not survive a restart.
    #[default]
    Memory,
    /// PostgreSQL via `database_url`.
    Postgres,
}

/// Storage service configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DataBrokerConfig {
    #[serde(default)]
    pub backend: DataBrokerBackend,

    /// PostgreSQL connection URL, required for the postgres backend.
    #[serde(default)]
    pub database_url: Option<String>,
}

/// Directory service configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DirectoryConfig {
    /// Endpoint that accepts user refresh requests. Directory refresh is
    /// disabled when unset.
    #[serde(default)]
    pub refresh_url: Option<String>,
}

/// A configuration value that parsed but is not usable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidConfig {
    /// A key failed to decode or has the wrong size.
    Key { field: &'static str, reason: String },
    /// A URL failed to parse or breaks the redirect policy.
    Url { field: &'static str, reason: String },
    /// A duration that must be positive is zero or negative.
    NotPositive { field: &'static str },
    /// The postgres backend was selected without a database URL.
    MissingDatabaseUrl,
}

impl fmt::Display for InvalidConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key { field, reason } => write!(f, "invalid {field}: {reason}"),
            Self::Url { field, reason } => write!(f, "invalid {field}: {reason}"),
            Self::NotPositive { field } => write!(f, "invalid {field}: must be positive"),
            Self::MissingDatabaseUrl => {
                write!(f, "databroker.database_url is required for the postgres backend")
            }
        }
    }
}

impl std::error::Error for InvalidConfig {}

impl ServerConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required configuration is missing or invalid.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(
                config::Environment::default()
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// The parsed public URL of this service.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig::Url` if the value is not an absolute http(s) URL.
    pub fn authenticate_url(&self) -> Result<Url, InvalidConfig> {
        parse_url("authenticate_url", &self.authenticate_url)
    }

    /// The parsed sign-out fallback URL, if configured.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig::Url` if the value is set but invalid.
    pub fn signout_redirect_url(&self) -> Result<Option<Url>, InvalidConfig> {
        self.signout_redirect_url
            .as_deref()
            .filter(|raw| !raw.is_empty())
            .map(|raw| parse_url("signout_redirect_url", raw))
            .transpose()
    }

    /// The decoded shared key.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig::Key` if the key is not 32 bytes of base64.
    pub fn shared_key(&self) -> Result<Vec<u8>, InvalidConfig> {
        decode_base64_key(&self.shared_secret).map_err(|e| key_error("shared_secret", e))
    }

    /// The decoded cookie key.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig::Key` if the key is not 32 bytes of base64.
    pub fn cookie_key(&self) -> Result<Vec<u8>, InvalidConfig> {
        decode_base64_key(&self.cookie_secret).map_err(|e| key_error("cookie_secret", e))
    }

    /// The JWKS signing key, if configured.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig::Key` if the seed is set but invalid.
    pub fn signing_key(&self) -> Result<Option<SigningKey>, InvalidConfig> {
        self.signing_key
            .as_deref()
            .filter(|raw| !raw.is_empty())
            .map(|raw| SigningKey::from_base64(raw).map_err(|e| key_error("signing_key", e)))
            .transpose()
    }

    /// The directory refresh endpoint, if configured.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig::Url` if the value is set but invalid.
    pub fn directory_refresh_url(&self) -> Result<Option<Url>, InvalidConfig> {
        self.directory
            .refresh_url
            .as_deref()
            .filter(|raw| !raw.is_empty())
            .map(|raw| parse_url("directory.refresh_url", raw))
            .transpose()
    }

    /// Lifetime of new sessions.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig::NotPositive` unless `cookie.expire_minutes > 0`.
    pub fn session_lifetime(&self) -> Result<chrono::Duration, InvalidConfig> {
        if self.cookie.expire_minutes <= 0 {
            return Err(InvalidConfig::NotPositive {
                field: "cookie.expire_minutes",
            });
        }
        Ok(chrono::Duration::minutes(self.cookie.expire_minutes))
    }

    /// Period of the expired-session cleanup task.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig::NotPositive` if the interval is zero.
    pub fn cleanup_interval(&self) -> Result<std::time::Duration, InvalidConfig> {
        match self.session.cleanup_interval_seconds {
            0 => Err(InvalidConfig::NotPositive {
                field: "session.cleanup_interval_seconds",
            }),
            secs => Ok(std::time::Duration::from_secs(secs)),
        }
    }

    /// The database URL for the postgres backend.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig::MissingDatabaseUrl` if it is not set.
    pub fn database_url(&self) -> Result<&str, InvalidConfig> {
        self.databroker
            .database_url
            .as_deref()
            .filter(|raw| !raw.is_empty())
            .ok_or(InvalidConfig::MissingDatabaseUrl)
    }
}

fn parse_url(field: &'static str, raw: &str) -> Result<Url, InvalidConfig> {
    parse_and_validate_url(raw).map_err(|e| InvalidConfig::Url {
        field,
        reason: e.to_string(),
    })
}

fn key_error(field: &'static str, err: CryptoError) -> InvalidConfig {
    InvalidConfig::Key {
        field,
        reason: err.to_string(),
    }
}
