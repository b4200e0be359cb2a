//! Telemetry event model, verbosity modes, policies, and sinks.
//!
//! This module defines what is recorded and whether it is forwarded:
//! - [`TelemetryEvent`] and its scope/role/phase/outcome enums
//! - [`TelemetryMode`] ordered verbosity with per-outcome carve-outs
//! - [`TelemetryPolicy`] sink-side inclusion filters
//! - [`TelemetrySink`] the external event-sink contract, with no-op,
//!   logging, collecting, and batching implementations
//! - [`emit`] the one routine every emission site goes through

mod batch;
mod emit;
mod event;
mod mode;
mod policy;
mod sink;

pub use batch::{BatchingTelemetrySink, TelemetryBatch};
pub use emit::{emit, TelemetryRuntime};
pub use event::{EventOutcome, EventPhase, EventRole, EventScope, TelemetryEvent};
pub use mode::TelemetryMode;
pub use policy::{
    CompositePolicy, MinimumDurationPolicy, PipelineSuppressionPolicy, RolePolicy,
    TelemetryPolicy,
};
pub use sink::{CollectingTelemetrySink, LoggingTelemetrySink, NoOpTelemetrySink, TelemetrySink};
