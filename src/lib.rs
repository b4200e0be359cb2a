//! # Conveyor
//!
//! A composable pipeline execution engine.
//!
//! Conveyor assembles small units of work into pipelines with structural
//! composition and uniform telemetry:
//!
//! - **Step-based execution**: Leaf steps mutate one per-invocation message
//! - **Structural composition**: Sequences, branches, loops, retry, and
//!   transactional/resource scoping that nest arbitrarily
//! - **Aspect chain**: Cross-cutting wrappers around the whole step list for
//!   error containment and sink substitution
//! - **Uniform telemetry**: Correlated Start/End event pairs for every
//!   component, filtered by an ordered verbosity mode
//! - **Cooperative stop and cancellation**: A stop flag on the message plus an
//!   external cancellation token, honored between steps
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use conveyor::prelude::*;
//!
//! let engine = Engine::builder("orders")
//!     .step(ValidateStep::new())
//!     .step(PriceStep::new())
//!     .finally_step(AuditStep::new())
//!     .build();
//!
//! let mut msg = Message::new().with_input(order);
//! engine.invoke(&mut msg).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod aspects;
pub mod cancellation;
pub mod engine;
pub mod errors;
pub mod message;
pub mod steps;
pub mod telemetry;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::aspects::{
        Aspect, AspectChain, ErrorContainmentAspect, LoggingAspect, Next,
        TelemetryFlushAspect, TelemetryRoutingAspect, TerminalHandler,
    };
    pub use crate::cancellation::CancellationToken;
    pub use crate::engine::{Engine, EngineBuilder, LifecycleHooks};
    pub use crate::errors::EngineError;
    pub use crate::message::{
        ExecutionState, InvokeStatus, Message, ServiceIdentity,
    };
    pub use crate::steps::{
        Conditional, FnStep, ForEach, IsolationLevel, NoOpStep, Repeat,
        RepeatUntil, ResourceAdapter, ResourceScope, Retry, Sequence, Step,
        StepEmission, StopStep, Switch, Transaction, TransactionAdapter,
        TransactionScope,
    };
    pub use crate::telemetry::{
        emit, CollectingTelemetrySink, EventOutcome, EventPhase, EventRole,
        EventScope, LoggingTelemetrySink, NoOpTelemetrySink, TelemetryEvent,
        TelemetryMode, TelemetryPolicy, TelemetryRuntime, TelemetrySink,
    };
}
