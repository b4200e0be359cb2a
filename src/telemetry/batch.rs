//! Aggregate batch shape and the batching sink that produces it.

use super::event::{EventOutcome, EventPhase, EventScope, TelemetryEvent};
use super::sink::TelemetrySink;
use crate::message::ServiceIdentity;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The persisted per-invocation aggregate record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryBatch {
    /// Correlation id of the invocation.
    pub pipeline_id: Uuid,
    /// Pipeline name.
    pub pipeline_name: String,
    /// Timestamp of the pipeline Start event.
    pub start_time: String,
    /// Timestamp of the pipeline End event.
    pub end_time: String,
    /// Total invocation duration in milliseconds.
    pub duration_ms: f64,
    /// Overall outcome, if the End event recorded one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<EventOutcome>,
    /// Failure or stop reason, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Identity of the emitting service.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_identity: Option<ServiceIdentity>,
    /// Every event of the invocation, in emission order.
    pub events: Vec<TelemetryEvent>,
}

/// A sink that buffers events and assembles one [`TelemetryBatch`] per flush.
///
/// The pipeline-scope Start and End events bound the batch; flushing without
/// a complete pair discards the buffer.
#[derive(Debug, Default)]
pub struct BatchingTelemetrySink {
    buffer: Mutex<Vec<TelemetryEvent>>,
    batches: Mutex<Vec<TelemetryBatch>>,
}

impl BatchingTelemetrySink {
    /// Creates a new batching sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all assembled batches.
    #[must_use]
    pub fn batches(&self) -> Vec<TelemetryBatch> {
        self.batches.lock().clone()
    }

    /// Drains and returns all assembled batches.
    #[must_use]
    pub fn take_batches(&self) -> Vec<TelemetryBatch> {
        std::mem::take(&mut *self.batches.lock())
    }
}

impl TelemetrySink for BatchingTelemetrySink {
    fn handle(&self, event: &TelemetryEvent) {
        self.buffer.lock().push(event.clone());
    }

    fn flush(&self) {
        let events: Vec<TelemetryEvent> = std::mem::take(&mut *self.buffer.lock());

        let start = events
            .iter()
            .find(|e| e.scope == EventScope::Pipeline && e.phase == EventPhase::Start);
        let end = events
            .iter()
            .find(|e| e.scope == EventScope::Pipeline && e.phase == EventPhase::End);

        let (Some(start), Some(end)) = (start, end) else {
            return;
        };

        let batch = TelemetryBatch {
            pipeline_id: start.correlation_id,
            pipeline_name: start.pipeline_name.clone(),
            start_time: start.timestamp.clone(),
            end_time: end.timestamp.clone(),
            duration_ms: end.duration_ms.unwrap_or_default(),
            outcome: Some(end.outcome),
            reason: end.reason.clone(),
            service_identity: start.service_identity.clone(),
            events,
        };
        self.batches.lock().push(batch);
    }
}
