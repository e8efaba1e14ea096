use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

use super::error::QstashError;
use crate::scheduler::{ScheduleError, SchedulingAdapter};

/// Broker acknowledgement for an accepted message.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishResponse {
    pub message_id: String,
}

/// Client for the QStash publish API.
///
/// QStash delivers a published JSON body to the destination URL after the
/// requested delay, retrying until the destination acknowledges (at-least-once).
pub struct QstashClient {
    token: String,
    client: Client,
    base_url: String,
}

impl QstashClient {
    /// Create a client pointing at a custom broker URL (local QStash server,
    /// or a mock in tests).
    pub fn new(token: String, base_url: String) -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()
            .expect("failed to build HTTP client");
        Self {
            token,
            client,
            base_url,
        }
    }

    /// Publish a JSON body for delivery to `destination` after `delay_seconds`.
    ///
    /// Maps to `POST {base}/v2/publish/{destination}` with a bearer token and
    /// an `Upstash-Delay` header.
    pub async fn publish_json(
        &self,
        destination: &str,
        body: &Value,
        delay_seconds: u64,
    ) -> Result<PublishResponse, QstashError> {
        let endpoint = format!(
            "{}/v2/publish/{}",
            self.base_url.trim_end_matches('/'),
            destination
        );

        let mut request = self
            .client
            .post(&endpoint)
            .header("authorization", format!("Bearer {}", self.token))
            .header("content-type", "application/json");
        if delay_seconds > 0 {
            request = request.header("upstash-delay", format!("{delay_seconds}s"));
        }

        let response = request.json(body).send().await?;
        let status = response.status();

        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(QstashError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json::<PublishResponse>()
            .await
            .map_err(|e| QstashError::ParseError(e.to_string()))
    }
}

#[async_trait]
impl SchedulingAdapter for QstashClient {
    async fn schedule(
        &self,
        url: &str,
        body: &Value,
        delay_seconds: u64,
    ) -> Result<String, ScheduleError> {
        match self.publish_json(url, body, delay_seconds).await {
            Ok(response) => Ok(response.message_id),
            Err(QstashError::ApiError { status, message }) => {
                Err(ScheduleError::Rejected { status, message })
            }
            Err(e) => Err(ScheduleError::Transport(e.to_string())),
        }
    }
}
