use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::notifier::CompletionNotifier;
use crate::scheduler::{ScheduleError, SchedulingAdapter};
use crate::sequence::{Sequence, Step};

/// Per-tick failure. Either way the cursor is not advanced: the broker's
/// redelivery of the inbound message is the only retry path.
#[derive(Debug, Error)]
pub enum TickError {
    #[error("step {index} call to {url} failed: {reason}")]
    StepExecution {
        index: usize,
        url: String,
        reason: String,
    },

    #[error("failed to schedule step {index}: {source}")]
    Scheduling {
        index: usize,
        #[source]
        source: ScheduleError,
    },
}

/// What a handled tick reports back to the delivering caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TickOutcome {
    pub success: bool,
    /// Cursor position as it was when this tick began.
    pub current_step: usize,
    pub total_steps: usize,
}

/// Executes exactly one step per inbound delivery and decides what happens next.
///
/// The engine keeps no state between ticks; the sequence payload is the state,
/// and durability belongs entirely to the injected [`SchedulingAdapter`]. Steps
/// may be executed more than once under the broker's at-least-once redelivery,
/// so every step endpoint is required to be idempotent — the engine does not
/// deduplicate ticks.
pub struct SequencerEngine {
    http: Client,
    scheduler: Arc<dyn SchedulingAdapter>,
    notifier: CompletionNotifier,
    /// The engine's own inbound route; the advanced payload is scheduled back
    /// here for the next tick.
    handler_url: String,
}

impl SequencerEngine {
    pub fn new(
        scheduler: Arc<dyn SchedulingAdapter>,
        handler_url: String,
        request_timeout: Duration,
    ) -> Self {
        let http = Client::builder()
            .timeout(request_timeout)
            .build()
            .expect("failed to build HTTP client");
        Self {
            http,
            scheduler,
            notifier: CompletionNotifier::new(request_timeout),
            handler_url,
        }
    }

    /// Handle one inbound delivery.
    ///
    /// Pending sequence: execute the step under the cursor, then either
    /// schedule the advanced payload after the next step's delay or, when that
    /// step was the last, run the completion path within the same tick.
    /// Already-complete sequence (including empty `steps`): execute nothing
    /// and go straight to the completion path — tail redeliveries are
    /// idempotent.
    pub async fn tick(&self, sequence: &Sequence) -> Result<TickOutcome, TickError> {
        let cursor = sequence.current_step_index;
        let total = sequence.total_steps();

        let Some(step) = sequence.current_step() else {
            info!(cursor, total, "sequence already complete, nothing to execute");
            self.run_completion(sequence).await;
            return Ok(TickOutcome {
                success: true,
                current_step: cursor,
                total_steps: total,
            });
        };

        info!(step = cursor + 1, total, url = %step.url, "executing step");
        self.execute_step(cursor, step).await?;

        let next = sequence.advanced();
        match next.current_step() {
            Some(upcoming) => {
                let body =
                    serde_json::to_value(&next).expect("sequence always serializes to JSON");
                let message_id = self
                    .scheduler
                    .schedule(&self.handler_url, &body, upcoming.delay_seconds)
                    .await
                    .map_err(|source| TickError::Scheduling {
                        index: next.current_step_index,
                        source,
                    })?;
                info!(
                    %message_id,
                    delay_seconds = upcoming.delay_seconds,
                    "scheduled next step"
                );
            }
            None => {
                info!(total, "final step done, sequence complete");
                self.run_completion(sequence).await;
            }
        }

        Ok(TickOutcome {
            success: true,
            current_step: cursor,
            total_steps: total,
        })
    }

    async fn execute_step(&self, index: usize, step: &Step) -> Result<(), TickError> {
        let response = self
            .http
            .post(&step.url)
            .header("content-type", "application/json")
            .json(&step.payload)
            .send()
            .await
            .map_err(|e| TickError::StepExecution {
                index,
                url: step.url.clone(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(TickError::StepExecution {
                index,
                url: step.url.clone(),
                reason: format!("target returned status {status}"),
            });
        }
        Ok(())
    }

    // Callback failure is deliberately non-fatal: the sequence's own
    // bookkeeping is finished, and a redelivered complete sequence will
    // re-attempt the notification.
    async fn run_completion(&self, sequence: &Sequence) {
        let Some(callback_url) = &sequence.callback_url else {
            return;
        };
        match self
            .notifier
            .notify(callback_url, sequence.metadata.as_ref())
            .await
        {
            Ok(()) => info!(%callback_url, "completion callback delivered"),
            Err(e) => warn!(%callback_url, error = %e, "completion callback failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};
    use std::sync::Mutex;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::scheduler::ScheduleError;

    #[derive(Debug)]
    struct Scheduled {
        url: String,
        body: Value,
        delay_seconds: u64,
    }

    /// In-memory adapter recording every schedule request, optionally failing.
    #[derive(Default)]
    struct RecordingScheduler {
        scheduled: Mutex<Vec<Scheduled>>,
        reject: bool,
    }

    impl RecordingScheduler {
        fn rejecting() -> Self {
            Self {
                reject: true,
                ..Default::default()
            }
        }
    }

    #[async_trait::async_trait]
    impl SchedulingAdapter for RecordingScheduler {
        async fn schedule(
            &self,
            url: &str,
            body: &Value,
            delay_seconds: u64,
        ) -> Result<String, ScheduleError> {
            if self.reject {
                return Err(ScheduleError::Rejected {
                    status: 503,
                    message: "broker unavailable".into(),
                });
            }
            self.scheduled.lock().unwrap().push(Scheduled {
                url: url.to_string(),
                body: body.clone(),
                delay_seconds,
            });
            Ok("msg_test".into())
        }
    }

    const HANDLER_URL: &str = "https://self.example/api/workflows/delayed-sequence";

    fn engine(scheduler: Arc<RecordingScheduler>) -> SequencerEngine {
        SequencerEngine::new(scheduler, HANDLER_URL.into(), Duration::from_secs(5))
    }

    fn two_step_sequence(step_base: &str, cursor: usize) -> Sequence {
        Sequence::parse(&json!({
            "steps": [
                {"url": format!("{step_base}/a"), "payload": {"x": 1}, "delay": 0},
                {"url": format!("{step_base}/b"), "payload": {"x": 2}, "delay": 30}
            ],
            "currentStepIndex": cursor,
            "metadata": {"job": "demo"}
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn first_tick_executes_step_and_schedules_next_with_its_delay() {
        let targets = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/a"))
            .and(body_json(json!({"x": 1})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&targets)
            .await;

        let scheduler = Arc::new(RecordingScheduler::default());
        let engine = engine(scheduler.clone());
        let sequence = two_step_sequence(&targets.uri(), 0);

        let outcome = engine.tick(&sequence).await.unwrap();

        assert_eq!(
            outcome,
            TickOutcome {
                success: true,
                current_step: 0,
                total_steps: 2
            }
        );

        let scheduled = scheduler.scheduled.lock().unwrap();
        assert_eq!(scheduled.len(), 1);
        assert_eq!(scheduled[0].url, HANDLER_URL);
        assert_eq!(scheduled[0].delay_seconds, 30);
        assert_eq!(scheduled[0].body["currentStepIndex"], json!(1));
        assert_eq!(scheduled[0].body["metadata"], json!({"job": "demo"}));
        // The step list travels unchanged with the re-scheduled payload.
        assert_eq!(scheduled[0].body["steps"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn final_tick_runs_callback_and_schedules_nothing() {
        let targets = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/b"))
            .and(body_json(json!({"x": 2})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&targets)
            .await;
        Mock::given(method("POST"))
            .and(path("/done"))
            .and(body_json(json!({
                "success": true,
                "completed": true,
                "metadata": {"job": "demo"}
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&targets)
            .await;

        let scheduler = Arc::new(RecordingScheduler::default());
        let engine = engine(scheduler.clone());
        let mut sequence = two_step_sequence(&targets.uri(), 1);
        sequence.callback_url = Some(format!("{}/done", targets.uri()));

        let outcome = engine.tick(&sequence).await.unwrap();

        assert_eq!(outcome.current_step, 1);
        assert_eq!(outcome.total_steps, 2);
        assert!(scheduler.scheduled.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn tail_delivery_is_idempotent_and_reattempts_callback() {
        let targets = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/done"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&targets)
            .await;

        let scheduler = Arc::new(RecordingScheduler::default());
        let engine = engine(scheduler.clone());
        let mut sequence = two_step_sequence(&targets.uri(), 2);
        sequence.callback_url = Some(format!("{}/done", targets.uri()));

        let outcome = engine.tick(&sequence).await.unwrap();

        assert_eq!(outcome.current_step, 2);
        assert_eq!(outcome.total_steps, 2);
        // No step was executed and nothing was re-scheduled.
        let step_calls = targets
            .received_requests()
            .await
            .unwrap()
            .iter()
            .filter(|r| r.url.path() != "/done")
            .count();
        assert_eq!(step_calls, 0);
        assert!(scheduler.scheduled.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_sequence_completes_immediately() {
        let targets = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/done"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&targets)
            .await;

        let scheduler = Arc::new(RecordingScheduler::default());
        let engine = engine(scheduler.clone());
        let sequence = Sequence::parse(&json!({
            "steps": [],
            "callbackUrl": format!("{}/done", targets.uri())
        }))
        .unwrap();

        let outcome = engine.tick(&sequence).await.unwrap();

        assert_eq!(
            outcome,
            TickOutcome {
                success: true,
                current_step: 0,
                total_steps: 0
            }
        );
    }

    #[tokio::test]
    async fn failing_step_does_not_advance_or_schedule() {
        let targets = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/a"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&targets)
            .await;

        let scheduler = Arc::new(RecordingScheduler::default());
        let engine = engine(scheduler.clone());
        let sequence = two_step_sequence(&targets.uri(), 0);

        let err = engine.tick(&sequence).await.unwrap_err();

        match err {
            TickError::StepExecution { index, .. } => assert_eq!(index, 0),
            other => panic!("expected StepExecution, got {other:?}"),
        }
        assert!(scheduler.scheduled.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn scheduling_failure_fails_tick_after_step_ran() {
        let targets = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/a"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&targets)
            .await;

        let scheduler = Arc::new(RecordingScheduler::rejecting());
        let engine = engine(scheduler);
        let sequence = two_step_sequence(&targets.uri(), 0);

        let err = engine.tick(&sequence).await.unwrap_err();

        // The current step already ran (accepted at-least-once duplicate risk);
        // the failed schedule means the broker will redeliver this same tick.
        match err {
            TickError::Scheduling { index, .. } => assert_eq!(index, 1),
            other => panic!("expected Scheduling, got {other:?}"),
        }
        assert_eq!(targets.received_requests().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn callback_failure_does_not_fail_tick() {
        let targets = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/b"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&targets)
            .await;
        Mock::given(method("POST"))
            .and(path("/done"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&targets)
            .await;

        let scheduler = Arc::new(RecordingScheduler::default());
        let engine = engine(scheduler);
        let mut sequence = two_step_sequence(&targets.uri(), 1);
        sequence.callback_url = Some(format!("{}/done", targets.uri()));

        let outcome = engine.tick(&sequence).await.unwrap();
        assert!(outcome.success);
    }

    #[tokio::test]
    async fn completion_without_callback_is_a_no_op() {
        let scheduler = Arc::new(RecordingScheduler::default());
        let engine = engine(scheduler.clone());
        let sequence = Sequence::parse(&json!({"steps": []})).unwrap();

        let outcome = engine.tick(&sequence).await.unwrap();

        assert!(outcome.success);
        assert!(scheduler.scheduled.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn tick_only_calls_the_step_under_the_cursor() {
        let targets = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/b"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&targets)
            .await;

        let scheduler = Arc::new(RecordingScheduler::default());
        let engine = engine(scheduler);
        let sequence = two_step_sequence(&targets.uri(), 1);

        engine.tick(&sequence).await.unwrap();

        let requests = targets.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].url.path(), "/b");
    }
}
