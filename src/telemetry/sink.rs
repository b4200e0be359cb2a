//! Telemetry sink trait and implementations.

use super::event::TelemetryEvent;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, info, Level};

/// Receives emitted telemetry events.
///
/// `handle` is called synchronously, once per emitted event. `flush` is called
/// once at invocation completion (wired through the flush aspect) so batching
/// adapters can emit an aggregate record.
pub trait TelemetrySink: Send + Sync {
    /// Handles one emitted event.
    fn handle(&self, event: &TelemetryEvent);

    /// Flushes any buffered state at invocation completion.
    fn flush(&self) {}
}

/// A sink that discards all events.
///
/// Used as the default when no sink is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpTelemetrySink;

impl TelemetrySink for NoOpTelemetrySink {
    fn handle(&self, _event: &TelemetryEvent) {
        // Intentionally empty - discards all events
    }
}

/// A sink that logs events using the tracing framework.
#[derive(Debug, Clone)]
pub struct LoggingTelemetrySink {
    level: Level,
}

impl Default for LoggingTelemetrySink {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

impl LoggingTelemetrySink {
    /// Creates a logging sink at the given level.
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    /// Creates a debug-level logging sink.
    #[must_use]
    pub fn debug() -> Self {
        Self::new(Level::DEBUG)
    }
}

impl TelemetrySink for LoggingTelemetrySink {
    fn handle(&self, event: &TelemetryEvent) {
        let mut line = format!(
            "{} {} [{}] outcome={}",
            event.component, event.phase, event.scope, event.outcome
        );
        if let Some(duration_ms) = event.duration_ms {
            line.push_str(&format!(" duration_ms={duration_ms:.1}"));
        }
        if let Some(reason) = &event.reason {
            line.push_str(&format!(" reason={reason:?}"));
        }
        if self.level == Level::DEBUG {
            debug!(target: "conveyor::telemetry", "{line}");
        } else {
            info!(target: "conveyor::telemetry", "{line}");
        }
    }
}

/// A collecting sink for assertions in tests.
#[derive(Debug, Default)]
pub struct CollectingTelemetrySink {
    events: RwLock<Vec<TelemetryEvent>>,
    flushes: AtomicUsize,
}

impl CollectingTelemetrySink {
    /// Creates a new collecting sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected events.
    #[must_use]
    pub fn events(&self) -> Vec<TelemetryEvent> {
        self.events.read().clone()
    }

    /// Returns the number of collected events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Returns true if no events have been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Returns how many times `flush` has been called.
    #[must_use]
    pub fn flush_count(&self) -> usize {
        self.flushes.load(Ordering::SeqCst)
    }

    /// Returns collected events for a component.
    #[must_use]
    pub fn events_for(&self, component: &str) -> Vec<TelemetryEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.component == component)
            .cloned()
            .collect()
    }

    /// Clears all collected events.
    pub fn clear(&self) {
        self.events.write().clear();
    }
}

impl TelemetrySink for CollectingTelemetrySink {
    fn handle(&self, event: &TelemetryEvent) {
        self.events.write().push(event.clone());
    }

    fn flush(&self) {
        self.flushes.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::{EventOutcome, EventPhase, EventRole, EventScope};

    fn event(component: &str) -> TelemetryEvent {
        TelemetryEvent::new(component, EventScope::Step, EventRole::Business, EventPhase::Start)
            .with_outcome(EventOutcome::Started)
    }

    #[test]
    fn test_noop_sink() {
        let sink = NoOpTelemetrySink;
        sink.handle(&event("x"));
        sink.flush();
        // Should not panic
    }

    #[test]
    fn test_logging_sink() {
        let sink = LoggingTelemetrySink::debug();
        sink.handle(&event("x"));
        // Should not panic
    }

    #[test]
    fn test_collecting_sink() {
        let sink = CollectingTelemetrySink::new();
        assert!(sink.is_empty());

        sink.handle(&event("a"));
        sink.handle(&event("b"));
        sink.handle(&event("a"));

        assert_eq!(sink.len(), 3);
        assert_eq!(sink.events_for("a").len(), 2);

        sink.flush();
        assert_eq!(sink.flush_count(), 1);

        sink.clear();
        assert!(sink.is_empty());
    }
}
