//! HTTP client for a running Moderator service

use crate::error::{Error, Result};
use crate::types::{ModerationRequest, ModerationResponse, Verdict};
use std::time::Duration;

const UNAVAILABLE_MESSAGE: &str = "Toxicity service is unavailable.";

/// Client for `POST /moderate` with verdict thresholding on the caller side
#[derive(Debug, Clone)]
pub struct ModerationClient {
    http: reqwest::Client,
    base_url: String,
    threshold: f32,
}

impl ModerationClient {
    /// Create a client for the service at `base_url`
    pub fn new(base_url: impl Into<String>, threshold: f32) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self::with_http_client(http, base_url, threshold))
    }

    /// Create a client reusing an existing reqwest client
    pub fn with_http_client(
        http: reqwest::Client,
        base_url: impl Into<String>,
        threshold: f32,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            threshold,
        }
    }

    /// Threshold used by [`ModerationClient::classify`]
    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Fetch raw class scores for `text`
    pub async fn moderate(&self, text: &str) -> Result<ModerationResponse> {
        let url = format!("{}/moderate", self.base_url);

        let response = self
            .http
            .post(&url)
            .json(&ModerationRequest::new(text))
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Moderation request to {} failed: {}", url, e);
                Error::unavailable(UNAVAILABLE_MESSAGE)
            })?;

        let status = response.status();
        if !status.is_success() {
            tracing::error!("Moderation service at {} returned {}", url, status);
            return Err(Error::unavailable(UNAVAILABLE_MESSAGE));
        }

        response.json::<ModerationResponse>().await.map_err(|e| {
            tracing::error!("Malformed moderation response from {}: {}", url, e);
            Error::unavailable(UNAVAILABLE_MESSAGE)
        })
    }

    /// Score `text` and tag every class above the client's threshold
    pub async fn classify(&self, text: &str) -> Result<Verdict> {
        let response = self.moderate(text).await?;
        Ok(Verdict::from_scores(response.first_scores(), self.threshold))
    }
}
