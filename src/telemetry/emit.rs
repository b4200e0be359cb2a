//! The single emission routine every instrumented site goes through.

use super::event::TelemetryEvent;
use super::mode::TelemetryMode;
use super::policy::TelemetryPolicy;
use super::sink::TelemetrySink;
use crate::errors::EngineError;
use crate::message::Message;
use std::sync::Arc;

/// Telemetry configuration the engine installs on each message it invokes.
pub struct TelemetryRuntime {
    /// Active verbosity mode.
    pub mode: TelemetryMode,
    /// Destination sink (unless a hook-stack override is active).
    pub sink: Arc<dyn TelemetrySink>,
    /// Optional inclusion policy, applied after the mode check.
    pub policy: Option<Arc<dyn TelemetryPolicy>>,
}

impl TelemetryRuntime {
    /// Creates a runtime with a mode and sink.
    #[must_use]
    pub fn new(mode: TelemetryMode, sink: Arc<dyn TelemetrySink>) -> Self {
        Self {
            mode,
            sink,
            policy: None,
        }
    }

    /// Sets the inclusion policy.
    #[must_use]
    pub fn with_policy(mut self, policy: Arc<dyn TelemetryPolicy>) -> Self {
        self.policy = Some(policy);
        self
    }
}

impl std::fmt::Debug for TelemetryRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryRuntime")
            .field("mode", &self.mode)
            .field("policy", &self.policy.is_some())
            .finish()
    }
}

/// Emits an event on behalf of a message.
///
/// Order: mode filter, then the service-identity requirement, then the
/// inclusion policy, then the sink. A missing service identity on an event
/// that passed the mode filter is a configuration error, raised here rather
/// than silently ignored. No runtime installed means telemetry is disabled
/// for the invocation and the event is dropped.
pub fn emit(msg: &Message, mut event: TelemetryEvent) -> Result<(), EngineError> {
    let Some(runtime) = msg.telemetry_runtime() else {
        return Ok(());
    };
    if !runtime.mode.allows(&event) {
        return Ok(());
    }

    event.correlation_id = msg.correlation_id();
    event.pipeline_name = msg.pipeline_name().unwrap_or_default().to_string();
    match msg.service_identity() {
        Some(identity) => event.service_identity = Some(identity.clone()),
        None => {
            return Err(EngineError::MissingServiceIdentity {
                pipeline: event.pipeline_name,
            })
        }
    }

    if let Some(policy) = &runtime.policy {
        if !policy.should_include(&event) {
            return Ok(());
        }
    }

    let sink = msg
        .hooks()
        .current_telemetry_sink()
        .unwrap_or_else(|| runtime.sink.clone());
    sink.handle(&event);
    Ok(())
}
