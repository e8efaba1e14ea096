use std::time::Duration;

use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("callback returned status {status}")]
    Rejected { status: u16 },

    #[error("callback unreachable: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Body delivered to a sequence's completion callback.
#[derive(Debug, Serialize)]
struct CompletionNotice<'a> {
    success: bool,
    completed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    metadata: Option<&'a Value>,
}

/// Posts the completion notice once a sequence's cursor reaches its step count.
///
/// Notification is best-effort: the engine logs a failure and still reports
/// the tick as successful, because the sequence's own bookkeeping is done
/// whether or not the downstream callback heard about it. A redelivered
/// already-complete sequence simply re-attempts the callback.
pub struct CompletionNotifier {
    client: Client,
}

impl CompletionNotifier {
    pub fn new(request_timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .expect("failed to build HTTP client");
        Self { client }
    }

    pub async fn notify(
        &self,
        callback_url: &str,
        metadata: Option<&Value>,
    ) -> Result<(), NotifyError> {
        let notice = CompletionNotice {
            success: true,
            completed: true,
            metadata,
        };
        let response = self
            .client
            .post(callback_url)
            .header("content-type", "application/json")
            .json(&notice)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn notify_posts_completion_body_with_metadata() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/done"))
            .and(body_json(json!({
                "success": true,
                "completed": true,
                "metadata": {"job": "demo"}
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let notifier = CompletionNotifier::new(Duration::from_secs(5));
        notifier
            .notify(&format!("{}/done", server.uri()), Some(&json!({"job": "demo"})))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn notify_omits_absent_metadata() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_json(json!({"success": true, "completed": true})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let notifier = CompletionNotifier::new(Duration::from_secs(5));
        notifier
            .notify(&format!("{}/done", server.uri()), None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(410))
            .mount(&server)
            .await;

        let notifier = CompletionNotifier::new(Duration::from_secs(5));
        let err = notifier
            .notify(&format!("{}/done", server.uri()), None)
            .await
            .unwrap_err();

        assert!(matches!(err, NotifyError::Rejected { status: 410 }));
    }
}
