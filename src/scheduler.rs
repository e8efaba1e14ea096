use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, warn};
use uuid::Uuid;

/// Failure to hand a message to the broker.
///
/// A schedule failure fails the whole tick: the cursor is not advanced, so the
/// broker's redelivery of the inbound message re-attempts the same step.
#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("broker rejected schedule request with status {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("broker unreachable: {0}")]
    Transport(String),
}

/// Capability to deliver a JSON payload to a URL no earlier than `delay_seconds`
/// from now.
///
/// Delivery is at-least-once and fire-and-acknowledge: a returned message id
/// means the broker accepted the message, not that it was delivered. No
/// exactly-once and no cross-message ordering is promised. Injected into the
/// engine so tests can swap in an in-memory recorder.
#[async_trait]
pub trait SchedulingAdapter: Send + Sync {
    async fn schedule(
        &self,
        url: &str,
        body: &Value,
        delay_seconds: u64,
    ) -> Result<String, ScheduleError>;
}

/// In-process scheduler for local development without a broker.
///
/// Sleeps the delay on a spawned task and POSTs the body to the URL. Purely
/// best-effort: messages do not survive a process restart and a failed
/// delivery is only logged, so this never stands in for the broker's
/// at-least-once contract outside of development.
pub struct LocalScheduler {
    http: Client,
}

impl LocalScheduler {
    pub fn new(request_timeout: Duration) -> Self {
        let http = Client::builder()
            .timeout(request_timeout)
            .build()
            .expect("failed to build HTTP client");
        Self { http }
    }
}

#[async_trait]
impl SchedulingAdapter for LocalScheduler {
    async fn schedule(
        &self,
        url: &str,
        body: &Value,
        delay_seconds: u64,
    ) -> Result<String, ScheduleError> {
        let message_id = format!("local-{}", Uuid::new_v4());
        let http = self.http.clone();
        let url = url.to_string();
        let body = body.clone();
        debug!(%message_id, %url, delay_seconds, "scheduling in-process delivery");

        tokio::spawn(async move {
            if delay_seconds > 0 {
                sleep(Duration::from_secs(delay_seconds)).await;
            }
            match http.post(&url).json(&body).send().await {
                Ok(response) if !response.status().is_success() => {
                    warn!(%url, status = %response.status(), "local delivery returned non-success");
                }
                Ok(_) => {}
                Err(e) => warn!(%url, error = %e, "local delivery failed"),
            }
        });

        Ok(message_id)
    }
}
