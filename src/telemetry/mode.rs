//! Ordered telemetry verbosity modes.

use super::event::{EventOutcome, EventScope, TelemetryEvent};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Ordered verbosity for telemetry emission.
///
/// Every emission site consults the active mode before invoking the sink.
/// Step-scope events are suppressed below [`PipelineAndSteps`](Self::PipelineAndSteps),
/// except error and stop outcomes permitted by the intermediate modes.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum TelemetryMode {
    /// Nothing is emitted.
    #[default]
    Off,
    /// Pipeline-scope events only.
    PipelineOnly,
    /// Pipeline-scope events plus step-scope exception outcomes.
    PipelineAndErrors,
    /// Pipeline-scope events plus step-scope exception and stop outcomes.
    PipelineErrorsAndStops,
    /// Everything, including per-step Start/End pairs.
    PipelineAndSteps,
}

impl TelemetryMode {
    /// Returns whether any emission is possible at all.
    #[must_use]
    pub fn is_enabled(self) -> bool {
        self > Self::Off
    }

    /// Returns whether an event passes this mode's filter.
    #[must_use]
    pub fn allows(self, event: &TelemetryEvent) -> bool {
        if self == Self::Off {
            return false;
        }
        match event.scope {
            EventScope::Pipeline => true,
            EventScope::Step => match event.outcome {
                EventOutcome::Exception => self >= Self::PipelineAndErrors,
                EventOutcome::Stopped => self >= Self::PipelineErrorsAndStops,
                _ => self >= Self::PipelineAndSteps,
            },
        }
    }
}

impl fmt::Display for TelemetryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Off => write!(f, "off"),
            Self::PipelineOnly => write!(f, "pipeline_only"),
            Self::PipelineAndErrors => write!(f, "pipeline_and_errors"),
            Self::PipelineErrorsAndStops => write!(f, "pipeline_errors_and_stops"),
            Self::PipelineAndSteps => write!(f, "pipeline_and_steps"),
        }
    }
}
