//! The identity provider contract.

use async_trait::async_trait;
use rootcause::prelude::Report;
use url::Url;

use crate::claims::IdentityClaims;
use crate::error::IdentityProviderError;
use crate::records::{OAuthToken, User};

/// Capabilities the authenticate service needs from an identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Short provider name, recorded in logs.
    fn name(&self) -> &str;

    /// The authorization endpoint URL carrying `state`.
    ///
    /// # Errors
    ///
    /// Returns `IdentityProviderError::Configuration` if the URL cannot be
    /// built.
    fn authorization_url(&self, state: &str) -> Result<Url, Report<IdentityProviderError>>;

    /// Exchanges an authorization code for tokens and verified claims.
    async fn authenticate(
        &self,
        code: &str,
    ) -> Result<(OAuthToken, IdentityClaims), Report<IdentityProviderError>>;

    /// Revokes a previously issued token.
    async fn revoke(&self, token: &OAuthToken) -> Result<(), Report<IdentityProviderError>>;

    /// The end-session endpoint, without query parameters.
    ///
    /// # Errors
    ///
    /// Returns `IdentityProviderError::SignOutNotImplemented` when the
    /// provider has no end-session endpoint.
    fn end_session_url(&self) -> Result<Url, IdentityProviderError>;

    /// Enriches `user` with the provider's view of the user.
    async fn update_user_info(
        &self,
        token: &OAuthToken,
        user: &mut User,
    ) -> Result<(), Report<IdentityProviderError>>;
}
