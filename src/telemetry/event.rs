//! The telemetry event model.
//!
//! Every structural primitive emits correlated Start/End pairs through this
//! model. Every Start pairs with exactly one End for the same component and
//! correlation id; self-emitting structural steps own both of their events and
//! their parent suppresses the generic pair it would otherwise emit.

use crate::message::ServiceIdentity;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// Whether an event describes the whole pipeline or a single step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventScope {
    /// The invocation as a whole.
    Pipeline,
    /// One step within the invocation.
    Step,
}

impl fmt::Display for EventScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pipeline => write!(f, "pipeline"),
            Self::Step => write!(f, "step"),
        }
    }
}

/// The role of the component an event describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventRole {
    /// A leaf unit of business work.
    Business,
    /// A structural step composing other steps.
    Structural,
    /// Not attributable to either (pipeline-scope events).
    None,
}

impl fmt::Display for EventRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Business => write!(f, "business"),
            Self::Structural => write!(f, "structural"),
            Self::None => write!(f, "none"),
        }
    }
}

/// Which end of a component's lifecycle an event marks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventPhase {
    /// Emitted before the component runs.
    Start,
    /// Emitted after the component returns, on every path.
    End,
}

impl fmt::Display for EventPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start => write!(f, "start"),
            Self::End => write!(f, "end"),
        }
    }
}

/// How a component's run concluded (or that it began).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EventOutcome {
    /// No outcome recorded.
    #[default]
    None,
    /// The component began running.
    Started,
    /// The component completed normally.
    Success,
    /// The component observed a stop signal.
    Stopped,
    /// The component raised a failure.
    Exception,
}

impl fmt::Display for EventOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Started => write!(f, "started"),
            Self::Success => write!(f, "success"),
            Self::Stopped => write!(f, "stopped"),
            Self::Exception => write!(f, "exception"),
        }
    }
}

/// A structured record of a step's or pipeline's lifecycle phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryEvent {
    /// Correlates all events of one invocation.
    pub correlation_id: Uuid,
    /// The pipeline the event belongs to.
    pub pipeline_name: String,
    /// Identity of the emitting service, if configured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_identity: Option<ServiceIdentity>,
    /// The component (step or pipeline) the event describes.
    pub component: String,
    /// Pipeline- or step-scope.
    pub scope: EventScope,
    /// Business, structural, or neither.
    pub role: EventRole,
    /// Start or End.
    pub phase: EventPhase,
    /// How the run concluded.
    pub outcome: EventOutcome,
    /// Failure or stop reason, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// ISO 8601 timestamp of emission.
    pub timestamp: String,
    /// Elapsed milliseconds; End events only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<f64>,
    /// Annotations drained from the message at emission.
    #[serde(default)]
    pub attributes: IndexMap<String, Value>,
}

impl TelemetryEvent {
    /// Creates an event for a component. Correlation id, pipeline name, and
    /// service identity are stamped from the message at emission time.
    #[must_use]
    pub fn new(
        component: impl Into<String>,
        scope: EventScope,
        role: EventRole,
        phase: EventPhase,
    ) -> Self {
        Self {
            correlation_id: Uuid::nil(),
            pipeline_name: String::new(),
            service_identity: None,
            component: component.into(),
            scope,
            role,
            phase,
            outcome: EventOutcome::None,
            reason: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
            duration_ms: None,
            attributes: IndexMap::new(),
        }
    }

    /// Sets the outcome.
    #[must_use]
    pub fn with_outcome(mut self, outcome: EventOutcome) -> Self {
        self.outcome = outcome;
        self
    }

    /// Sets the failure or stop reason.
    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Sets the elapsed duration in milliseconds.
    #[must_use]
    pub fn with_duration_ms(mut self, duration_ms: f64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    /// Replaces the attribute map.
    #[must_use]
    pub fn with_attributes(mut self, attributes: IndexMap<String, Value>) -> Self {
        self.attributes = attributes;
        self
    }

    /// Adds a single attribute.
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    /// True for outcomes the reduced verbosity modes still let through.
    #[must_use]
    pub fn is_error_or_stop(&self) -> bool {
        matches!(self.outcome, EventOutcome::Exception | EventOutcome::Stopped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builder_chain() {
        let event = TelemetryEvent::new("retry", EventScope::Step, EventRole::Structural, EventPhase::End)
            .with_outcome(EventOutcome::Exception)
            .with_reason("timeout: db")
            .with_duration_ms(12.5)
            .with_attribute("attempts", json!(3));

        assert_eq!(event.component, "retry");
        assert_eq!(event.outcome, EventOutcome::Exception);
        assert_eq!(event.reason.as_deref(), Some("timeout: db"));
        assert_eq!(event.duration_ms, Some(12.5));
        assert_eq!(event.attributes.get("attempts"), Some(&json!(3)));
        assert!(event.is_error_or_stop());
    }

    #[test]
    fn test_serialization_round_trip() {
        let event = TelemetryEvent::new("seq", EventScope::Pipeline, EventRole::None, EventPhase::Start)
            .with_outcome(EventOutcome::Started);

        let encoded = serde_json::to_string(&event).unwrap();
        assert!(encoded.contains("\"scope\":\"pipeline\""));
        assert!(encoded.contains("\"outcome\":\"started\""));

        let decoded: TelemetryEvent = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded.component, "seq");
        assert_eq!(decoded.phase, EventPhase::Start);
    }

    #[test]
    fn test_display_impls() {
        assert_eq!(EventScope::Step.to_string(), "step");
        assert_eq!(EventRole::Structural.to_string(), "structural");
        assert_eq!(EventPhase::End.to_string(), "end");
        assert_eq!(EventOutcome::Stopped.to_string(), "stopped");
    }
}
