//! Bounded retry with backoff for transient failures.

use super::instrument::{end_outcome, run_children};
use super::{Step, StepEmission, StepList};
use crate::errors::EngineError;
use crate::message::Message;
use crate::telemetry::{emit, EventOutcome, EventPhase, EventRole, EventScope, TelemetryEvent};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Decides whether a failure is worth retrying.
pub type RetryPredicate = Arc<dyn Fn(&EngineError) -> bool + Send + Sync>;

/// Computes the backoff delay from the next attempt number and the message.
pub type DelayFn = Arc<dyn Fn(u32, &Message) -> Duration + Send + Sync>;

/// Observes each retry with the attempt number that just failed.
pub type OnRetrying = Arc<dyn Fn(u32) + Send + Sync>;

/// Retries its body on transient failures, up to a bound, with backoff.
///
/// The attempt counter starts at 1. The default predicate matches the
/// timeout/deadlock/transport signatures; the default delay is linear,
/// `attempt × 2` seconds. Exhausting the bound, or a failure the predicate
/// rejects, re-raises the error unchanged. Only this step performs automatic
/// recovery; every other structural step is fail-fast.
///
/// Self-emitting: its Start captures the maximum attempt count, its End the
/// final attempt count and, when any retry occurred, the retry count and last
/// failure reason.
pub struct Retry {
    name: String,
    body: StepList,
    max_retries: u32,
    predicate: RetryPredicate,
    delay: DelayFn,
    on_retrying: Option<OnRetrying>,
}

impl Retry {
    /// Creates a retry scope with the default predicate and delay.
    #[must_use]
    pub fn new(name: impl Into<String>, max_retries: u32) -> Self {
        Self {
            name: name.into(),
            body: Vec::new(),
            max_retries,
            predicate: Arc::new(EngineError::is_transient),
            delay: Arc::new(|attempt, _msg| Duration::from_secs(u64::from(attempt) * 2)),
            on_retrying: None,
        }
    }

    /// Appends a body step.
    #[must_use]
    pub fn step(mut self, step: impl Step + 'static) -> Self {
        self.body.push(Arc::new(step));
        self
    }

    /// Appends an already-shared body step.
    #[must_use]
    pub fn step_arc(mut self, step: Arc<dyn Step>) -> Self {
        self.body.push(step);
        self
    }

    /// Overrides the retry predicate.
    #[must_use]
    pub fn with_predicate<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&EngineError) -> bool + Send + Sync + 'static,
    {
        self.predicate = Arc::new(predicate);
        self
    }

    /// Overrides the delay function of `(next_attempt, message)`.
    #[must_use]
    pub fn with_delay<D>(mut self, delay: D) -> Self
    where
        D: Fn(u32, &Message) -> Duration + Send + Sync + 'static,
    {
        self.delay = Arc::new(delay);
        self
    }

    /// Registers a callback invoked with the attempt number that just failed.
    #[must_use]
    pub fn on_retrying<C>(mut self, callback: C) -> Self
    where
        C: Fn(u32) + Send + Sync + 'static,
    {
        self.on_retrying = Some(Arc::new(callback));
        self
    }
}

#[async_trait]
impl Step for Retry {
    fn name(&self) -> &str {
        &self.name
    }

    fn emission(&self) -> StepEmission {
        StepEmission::SelfEmitting
    }

    async fn execute(&self, msg: &mut Message) -> Result<(), EngineError> {
        let attributes = msg.state_mut().take_annotations();
        let start_emitted = emit(
            msg,
            TelemetryEvent::new(
                &self.name,
                EventScope::Step,
                EventRole::Structural,
                EventPhase::Start,
            )
            .with_outcome(EventOutcome::Started)
            .with_attributes(attributes)
            .with_attribute("max_attempts", json!(self.max_retries + 1)),
        );

        let started = Instant::now();
        let mut attempt: u32 = 1;
        let mut retries: u32 = 0;
        let mut last_reason: Option<String> = None;

        let result = loop {
            if msg.should_stop() {
                break Ok(());
            }
            match run_children(msg, &self.body).await {
                Ok(()) => break Ok(()),
                Err(error) => {
                    if (self.predicate)(&error) && attempt <= self.max_retries {
                        let reason = error.to_string();
                        tracing::debug!(
                            attempt,
                            error = %reason,
                            "retrying after transient failure"
                        );
                        last_reason = Some(reason.clone());
                        msg.state_mut().annotate("retry_reason", json!(reason));
                        if let Some(callback) = &self.on_retrying {
                            callback(attempt);
                        }
                        attempt += 1;
                        retries += 1;
                        tokio::time::sleep((self.delay)(attempt, msg)).await;
                    } else {
                        break Err(error);
                    }
                }
            }
        };

        let duration_ms = started.elapsed().as_secs_f64() * 1000.0;
        let (outcome, reason) = end_outcome(msg, &result);
        let mut attributes = msg.state_mut().take_annotations();
        attributes.insert("attempts".into(), json!(attempt));
        if retries > 0 {
            attributes.insert("retries".into(), json!(retries));
            if let Some(last) = &last_reason {
                attributes.insert("last_retry_reason".into(), json!(last));
            }
        }
        let mut end = TelemetryEvent::new(
            &self.name,
            EventScope::Step,
            EventRole::Structural,
            EventPhase::End,
        )
        .with_outcome(outcome)
        .with_duration_ms(duration_ms)
        .with_attributes(attributes);
        if let Some(reason) = reason {
            end = end.with_reason(reason);
        }
        let end_emitted = emit(msg, end);

        match result {
            Err(e) => Err(e),
            Ok(()) => start_emitted.and(end_emitted),
        }
    }
}

impl std::fmt::Debug for Retry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Retry")
            .field("name", &self.name)
            .field("max_retries", &self.max_retries)
            .field("body", &self.body.len())
            .finish()
    }
}
