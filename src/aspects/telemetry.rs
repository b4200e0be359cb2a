//! Telemetry routing and flush aspects.

use super::{Aspect, Next};
use crate::errors::EngineError;
use crate::message::Message;
use crate::telemetry::TelemetrySink;
use async_trait::async_trait;
use std::sync::Arc;

/// Flushes the active telemetry sink once at invocation completion, success
/// or failure, so batching adapters can emit their aggregate record.
///
/// The engine registers this innermost when telemetry is configured; the
/// flush therefore runs after the pipeline End event has been handled.
#[derive(Debug, Clone, Copy, Default)]
pub struct TelemetryFlushAspect;

impl TelemetryFlushAspect {
    /// Creates the flush aspect.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Aspect for TelemetryFlushAspect {
    fn name(&self) -> &str {
        "telemetry_flush"
    }

    async fn invoke(&self, msg: &mut Message, next: Next<'_>) -> Result<(), EngineError> {
        let result = next.run(msg).await;
        let sink = msg
            .hooks()
            .current_telemetry_sink()
            .or_else(|| msg.telemetry_runtime().map(|rt| rt.sink.clone()));
        if let Some(sink) = sink {
            sink.flush();
        }
        result
    }
}

/// Routes telemetry to a substitute sink for the duration of the call,
/// restoring the previous registration afterwards on every path out.
pub struct TelemetryRoutingAspect {
    sink: Arc<dyn TelemetrySink>,
}

impl TelemetryRoutingAspect {
    /// Creates a routing aspect targeting the given sink.
    #[must_use]
    pub fn new(sink: Arc<dyn TelemetrySink>) -> Self {
        Self { sink }
    }
}

#[async_trait]
impl Aspect for TelemetryRoutingAspect {
    fn name(&self) -> &str {
        "telemetry_routing"
    }

    async fn invoke(&self, msg: &mut Message, next: Next<'_>) -> Result<(), EngineError> {
        msg.hooks_mut().push_telemetry_sink(self.sink.clone());
        let result = next.run(msg).await;
        msg.hooks_mut().pop_telemetry_sink();
        result
    }
}
