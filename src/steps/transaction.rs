//! Transactional scoping around a group of steps.

use super::instrument::{end_outcome, run_children};
use super::{Step, StepEmission, StepList};
use crate::errors::EngineError;
use crate::message::Message;
use crate::telemetry::{emit, EventOutcome, EventPhase, EventRole, EventScope, TelemetryEvent};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// Transaction isolation requested from the adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum IsolationLevel {
    /// Dirty reads permitted.
    ReadUncommitted,
    /// The default.
    #[default]
    ReadCommitted,
    /// Repeatable reads.
    RepeatableRead,
    /// Full serializability.
    Serializable,
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadUncommitted => write!(f, "read_uncommitted"),
            Self::ReadCommitted => write!(f, "read_committed"),
            Self::RepeatableRead => write!(f, "repeatable_read"),
            Self::Serializable => write!(f, "serializable"),
        }
    }
}

/// An open transaction; consumed by exactly one of commit or rollback.
#[async_trait]
pub trait Transaction: Send + Sync {
    /// Commits the transaction.
    async fn commit(self: Box<Self>) -> Result<(), EngineError>;

    /// Rolls the transaction back.
    async fn rollback(self: Box<Self>) -> Result<(), EngineError>;
}

/// Opens transactions for a [`TransactionScope`].
///
/// Structural steps depend only on this shape, never on a specific resource
/// technology.
#[async_trait]
pub trait TransactionAdapter: Send + Sync {
    /// Begins a transaction at the requested isolation level.
    async fn begin(
        &self,
        msg: &Message,
        isolation: IsolationLevel,
    ) -> Result<Box<dyn Transaction>, EngineError>;
}

/// Runs its body inside a transaction and decides commit or rollback.
///
/// Decision order after the body returns: a body failure rolls back and
/// re-raises the original error; pending cancellation at the commit decision
/// rolls back and raises a cancellation error, even if the body nominally
/// succeeded; a false commit flag rolls back explicitly; a raised stop flag
/// rolls back without attempting commit; otherwise the transaction commits.
///
/// Self-emitting: its events capture the isolation level and disposition.
pub struct TransactionScope {
    name: String,
    adapter: Arc<dyn TransactionAdapter>,
    isolation: IsolationLevel,
    body: StepList,
}

impl TransactionScope {
    /// Creates a scope at the default read-committed isolation.
    #[must_use]
    pub fn new(name: impl Into<String>, adapter: Arc<dyn TransactionAdapter>) -> Self {
        Self {
            name: name.into(),
            adapter,
            isolation: IsolationLevel::default(),
            body: Vec::new(),
        }
    }

    /// Sets the isolation level.
    #[must_use]
    pub fn with_isolation(mut self, isolation: IsolationLevel) -> Self {
        self.isolation = isolation;
        self
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

    /// Runs the body and settles the transaction. Returns the settled result
    /// and the disposition recorded on the End event.
    async fn run_scoped(
        &self,
        msg: &mut Message,
        txn: Box<dyn Transaction>,
    ) -> (Result<(), EngineError>, &'static str) {
        match run_children(msg, &self.body).await {
            Err(error) => {
                if let Err(rollback_err) = txn.rollback().await {
                    tracing::warn!(error = %rollback_err, "rollback failed after body failure");
                }
                (Err(error), "rolled_back")
            }
            Ok(()) => {
                if msg.cancellation().is_cancelled() {
                    // Cancellation observed exactly at the commit decision:
                    // rollback, then raise - never commit.
                    let reason = msg
                        .cancellation()
                        .reason()
                        .unwrap_or_else(|| "cancellation requested".to_string());
                    let result = match txn.rollback().await {
                        Ok(()) => Err(EngineError::Cancelled(reason)),
                        Err(rollback_err) => {
                            tracing::warn!(error = %rollback_err, "rollback failed on cancellation");
                            Err(EngineError::Cancelled(reason))
                        }
                    };
                    (result, "rolled_back")
                } else if !msg.commit() {
                    (txn.rollback().await, "rolled_back")
                } else if msg.state().is_stopped() {
                    (txn.rollback().await, "rolled_back")
                } else {
                    (txn.commit().await, "committed")
                }
            }
        }
    }
}

#[async_trait]
impl Step for TransactionScope {
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
            .with_attribute("isolation_level", json!(self.isolation.to_string())),
        );

        let started = Instant::now();
        let (result, disposition) = match self.adapter.begin(msg, self.isolation).await {
            Ok(txn) => self.run_scoped(msg, txn).await,
            Err(begin_err) => (Err(begin_err), "not_started"),
        };

        let duration_ms = started.elapsed().as_secs_f64() * 1000.0;
        let (outcome, reason) = end_outcome(msg, &result);
        let attributes = msg.state_mut().take_annotations();
        let mut end = TelemetryEvent::new(
            &self.name,
            EventScope::Step,
            EventRole::Structural,
            EventPhase::End,
        )
        .with_outcome(outcome)
        .with_duration_ms(duration_ms)
        .with_attributes(attributes)
        .with_attribute("isolation_level", json!(self.isolation.to_string()))
        .with_attribute("disposition", json!(disposition));
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

impl fmt::Debug for TransactionScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionScope")
            .field("name", &self.name)
            .field("isolation", &self.isolation)
            .field("body", &self.body.len())
            .finish()
    }
}
