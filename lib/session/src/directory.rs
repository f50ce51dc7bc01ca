//! The directory refresh contract.

use async_trait::async_trait;
use portcullis_core::UserId;
use rootcause::prelude::Report;

use crate::error::DirectoryError;

/// Re-syncs a user's directory data (profile, group membership).
#[async_trait]
pub trait DirectoryClient: Send + Sync {
    /// Refreshes `user_id` using the access token from their latest sign-in.
    async fn refresh_user(
        &self,
        user_id: &UserId,
        access_token: &str,
    ) -> Result<(), Report<DirectoryError>>;
}

/// A directory client for deployments without a directory service.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledDirectory;

#[async_trait]
impl DirectoryClient for DisabledDirectory {
    async fn refresh_user(
        &self,
        user_id: &UserId,
        _access_token: &str,
    ) -> Result<(), Report<DirectoryError>> {
        tracing::debug!(%user_id, "directory disabled, skipping refresh");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disabled_directory_always_succeeds() {
        let client: &dyn DirectoryClient = &DisabledDirectory;
        assert!(
            client
                .refresh_user(&UserId::new("user-1"), "token")
                .await
                .is_ok()
        );
    }
}
