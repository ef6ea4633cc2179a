//! Polling client for a running feed server

use std::time::Duration;

use eyre::{Context, Result};
use serde::Deserialize;
use tracing::debug;

use crate::server::{STATUS_PATH, WINDOW_PATH};
use crate::window::Window;

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

/// HTTP client for `/getECGData` and `/status`
#[derive(Debug, Clone)]
pub struct FeedClient {
    base_url: String,
    http: reqwest::Client,
}

impl FeedClient {
    /// Create a client for the server at `base_url` (e.g. `http://127.0.0.1:3000`)
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        debug!(%base_url, ?timeout, "FeedClient::new: called");
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("ecgfeed/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { base_url, http })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch the next window, advancing the server's cursor
    pub async fn fetch_window(&self) -> Result<Window> {
        self.get_json(WINDOW_PATH).await
    }

    /// Fetch the server's status snapshot
    pub async fn fetch_status(&self) -> Result<serde_json::Value> {
        self.get_json(STATUS_PATH).await
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        debug!(%url, "FeedClient::get_json: sending request");

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Failed to reach {}", url))?;

        let status = response.status();
        if !status.is_success() {
            debug!(%status, "FeedClient::get_json: error status");
            let message = response
                .json::<ErrorBody>()
                .await
                .map(|b| b.error)
                .unwrap_or_else(|_| "no error message".to_string());
            return Err(eyre::eyre!("Server returned {}: {}", status, message));
        }

        response
            .json::<T>()
            .await
            .with_context(|| format!("Invalid response body from {}", url))
    }
}
