//! Sink-side inclusion policies, applied after the mode check.

use super::event::{EventRole, TelemetryEvent};
use std::sync::Arc;

/// Decides whether an event that already passed the mode filter is forwarded
/// to the sink.
pub trait TelemetryPolicy: Send + Sync {
    /// Returns true if the event should reach the sink.
    fn should_include(&self, event: &TelemetryEvent) -> bool;
}

/// A composite policy requiring all sub-policies to pass.
#[derive(Default)]
pub struct CompositePolicy {
    policies: Vec<Arc<dyn TelemetryPolicy>>,
}

impl CompositePolicy {
    /// Creates an empty composite (which passes everything).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a sub-policy.
    #[must_use]
    pub fn with(mut self, policy: Arc<dyn TelemetryPolicy>) -> Self {
        self.policies.push(policy);
        self
    }
}

impl TelemetryPolicy for CompositePolicy {
    fn should_include(&self, event: &TelemetryEvent) -> bool {
        self.policies.iter().all(|p| p.should_include(event))
    }
}

/// Excludes End events that completed faster than a threshold.
///
/// Error and stop outcomes always pass; events without a duration (Start
/// events) always pass.
#[derive(Debug, Clone, Copy)]
pub struct MinimumDurationPolicy {
    threshold_ms: f64,
}

impl MinimumDurationPolicy {
    /// Creates a policy with the given threshold in milliseconds.
    #[must_use]
    pub fn new(threshold_ms: f64) -> Self {
        Self { threshold_ms }
    }
}

impl TelemetryPolicy for MinimumDurationPolicy {
    fn should_include(&self, event: &TelemetryEvent) -> bool {
        if event.is_error_or_stop() {
            return true;
        }
        match event.duration_ms {
            Some(d) => d >= self.threshold_ms,
            None => true,
        }
    }
}

/// Includes only events whose role is in the allowed set.
#[derive(Debug, Clone)]
pub struct RolePolicy {
    allowed: Vec<EventRole>,
}

impl RolePolicy {
    /// Creates a policy allowing the given roles.
    #[must_use]
    pub fn new(allowed: Vec<EventRole>) -> Self {
        Self { allowed }
    }

    /// Allows business-role events only.
    #[must_use]
    pub fn business_only() -> Self {
        Self::new(vec![EventRole::Business, EventRole::None])
    }
}

impl TelemetryPolicy for RolePolicy {
    fn should_include(&self, event: &TelemetryEvent) -> bool {
        self.allowed.contains(&event.role)
    }
}

/// Suppresses all events of named pipelines.
#[derive(Debug, Clone, Default)]
pub struct PipelineSuppressionPolicy {
    suppressed: Vec<String>,
}

impl PipelineSuppressionPolicy {
    /// Creates a policy suppressing the given pipeline names.
    #[must_use]
    pub fn new(suppressed: Vec<String>) -> Self {
        Self { suppressed }
    }
}

impl TelemetryPolicy for PipelineSuppressionPolicy {
    fn should_include(&self, event: &TelemetryEvent) -> bool {
        !self.suppressed.iter().any(|p| p == &event.pipeline_name)
    }
}
