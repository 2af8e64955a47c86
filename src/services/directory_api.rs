//! HTTP client for the roster and aggregate-unread endpoints.

use std::time::Duration;
use url::Url;

use super::chat_types::{RosterUser, UnreadCount};
use crate::error::{ParleyError, Result};

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait DirectoryApi: Send + Sync {
    /// All registered users.
    async fn fetch_roster(&self) -> Result<Vec<RosterUser>>;

    /// Unread counts addressed to `identity`, grouped by sender.
    async fn fetch_unread(&self, identity: &str) -> Result<Vec<UnreadCount>>;
}

pub struct HttpDirectoryApi {
    base_url: Url,
    http_client: reqwest::Client,
}

impl HttpDirectoryApi {
    pub fn new(api_url: &str) -> Result<Self> {
        let mut normalized = api_url.trim().to_string();
        if !normalized.ends_with('/') {
            normalized.push('/');
        }
        let base_url = Url::parse(&normalized)
            .map_err(|e| ParleyError::Config(format!("Invalid API URL {}: {}", api_url, e)))?;

        Ok(Self {
            base_url,
            http_client: reqwest::Client::builder()
                .timeout(Duration::from_secs(15))
                .build()
                .unwrap_or_default(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self
            .base_url
            .join(path)
            .map_err(|e| ParleyError::Http(format!("Bad request path {}: {}", path, e)))?;

        let response = self
            .http_client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| ParleyError::Http(format!("Request to {} failed: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(ParleyError::Http(format!(
                "{} returned {}",
                url,
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| ParleyError::Http(format!("Failed to parse {}: {}", url, e)))
    }
}

#[async_trait::async_trait]
impl DirectoryApi for HttpDirectoryApi {
    async fn fetch_roster(&self) -> Result<Vec<RosterUser>> {
        self.get_json("api/users").await
    }

    async fn fetch_unread(&self, identity: &str) -> Result<Vec<UnreadCount>> {
        let path = format!("api/messages/unread/{}", urlencoding::encode(identity));
        self.get_json(&path).await
    }
}
