//! Per-invocation hook stacks for swappable log and telemetry sinks.
//!
//! Aspects substitute sinks for the duration of their call by pushing onto
//! these stacks and popping on the way out, success or failure. The scoped
//! push/pop replaces publicly mutable callback fields: nested aspects compose
//! without losing earlier registrations.

use crate::telemetry::TelemetrySink;
use std::sync::Arc;

/// A single-argument "write line" logging callback.
pub type LogSink = Arc<dyn Fn(&str) + Send + Sync>;

/// Stacks of sink overrides carried by the message.
#[derive(Default)]
pub struct HookStack {
    log_sinks: Vec<LogSink>,
    telemetry_sinks: Vec<Arc<dyn TelemetrySink>>,
}

impl HookStack {
    /// Creates an empty hook stack.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pushes a log sink override.
    pub fn push_log_sink(&mut self, sink: LogSink) {
        self.log_sinks.push(sink);
    }

    /// Pops the most recent log sink override.
    pub fn pop_log_sink(&mut self) -> Option<LogSink> {
        self.log_sinks.pop()
    }

    /// Returns the active log sink override, if any.
    #[must_use]
    pub fn current_log_sink(&self) -> Option<&LogSink> {
        self.log_sinks.last()
    }

    /// Pushes a telemetry sink override.
    pub fn push_telemetry_sink(&mut self, sink: Arc<dyn TelemetrySink>) {
        self.telemetry_sinks.push(sink);
    }

    /// Pops the most recent telemetry sink override.
    pub fn pop_telemetry_sink(&mut self) -> Option<Arc<dyn TelemetrySink>> {
        self.telemetry_sinks.pop()
    }

    /// Returns the active telemetry sink override, if any.
    #[must_use]
    pub fn current_telemetry_sink(&self) -> Option<Arc<dyn TelemetrySink>> {
        self.telemetry_sinks.last().cloned()
    }
}

impl std::fmt::Debug for HookStack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookStack")
            .field("log_sinks", &self.log_sinks.len())
            .field("telemetry_sinks", &self.telemetry_sinks.len())
            .finish()
    }
}
