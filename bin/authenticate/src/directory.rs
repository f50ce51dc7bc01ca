//! HTTP directory refresh client.

use async_trait::async_trait;
use portcullis_core::UserId;
use portcullis_session::{DirectoryClient, DirectoryError};
use rootcause::prelude::Report;
use serde::Serialize;
use tracing::instrument;
use url::Url;

#[derive(Serialize)]
struct RefreshRequest<'a> {
    user_id: &'a str,
    access_token: &'a str,
}

/// Asks a directory service to re-sync a user over HTTP.
///
/// The service receives `POST {"user_id": ..., "access_token": ...}` and
/// answers with any 2xx status on success.
#[derive(Debug, Clone)]
pub struct HttpDirectoryClient {
    http_client: reqwest::Client,
    refresh_url: Url,
}

impl HttpDirectoryClient {
    #[must_use]
    pub fn new(http_client: reqwest::Client, refresh_url: Url) -> Self {
        Self {
            http_client,
            refresh_url,
        }
    }
}

#[async_trait]
impl DirectoryClient for HttpDirectoryClient {
    #[instrument(skip(self, access_token))]
    async fn refresh_user(
        &self,
        user_id: &UserId,
        access_token: &str,
    ) -> Result<(), Report<DirectoryError>> {
        let response = self
            .http_client
            .post(self.refresh_url.clone())
            .json(&RefreshRequest {
                user_id: user_id.as_str(),
                access_token,
            })
            .send()
            .await
            .map_err(|e| DirectoryError::RequestFailed {
                details: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(DirectoryError::Rejected {
                status: status.as_u16(),
            }
            .into());
        }
        Ok(())
    }
}
