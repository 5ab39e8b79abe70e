//! REST calls consumed by the real-time layer.
//!
//! Everything request/response-shaped lives on the backend; this client only
//! needs the authoritative unread count fetched at connect time.

use std::time::Duration;

use serde::Deserialize;

use crate::error::RealtimeError;

/// Timeout for ancillary REST calls. Expiry is non-fatal: callers log the
/// failure and proceed without the seed.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Thin bearer-authenticated client for the Focal backend API.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct UnreadCountBody {
    count: u64,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, RealtimeError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// `GET /notifications/unread-count` → the authoritative unread count.
    pub async fn unread_count(&self, token: &str) -> Result<u64, RealtimeError> {
        let body: UnreadCountBody = self
            .http
            .get(format!("{}/notifications/unread-count", self.base_url))
            .bearer_auth(token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(body.count)
    }
}
