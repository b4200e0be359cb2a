//! The execution engine driving one invocation end to end.

mod builder;
#[cfg(test)]
mod integration_tests;

pub use builder::EngineBuilder;

use crate::aspects::{AspectChain, TerminalHandler};
use crate::errors::EngineError;
use crate::message::Message;
use crate::steps::instrument::{end_outcome, run_child, run_children};
use crate::steps::Step;
use crate::telemetry::{
    emit, EventOutcome, EventPhase, EventRole, EventScope, TelemetryEvent, TelemetryRuntime,
};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;

/// Callbacks fired around each invocation.
///
/// Order: `on_start` before anything, then `on_success` or `on_error`, then
/// `on_complete` - always, last, even after an error.
pub trait LifecycleHooks: Send + Sync {
    /// Fired before the aspect chain runs.
    fn on_start(&self, _msg: &Message) {}

    /// Fired when the chain returned cleanly.
    fn on_success(&self, _msg: &Message) {}

    /// Fired when a failure escaped the chain.
    fn on_error(&self, _msg: &Message, _error: &EngineError) {}

    /// Fired last on every invocation.
    fn on_complete(&self, _msg: &Message) {}
}

/// An immutable pipeline definition: aspect chain, ordered top-level steps,
/// and finally-steps.
///
/// Definitions are stateless once built; all mutable state lives on the
/// per-invocation [`Message`], so concurrent invocations of one engine over
/// distinct messages are safe. Fan-out across many messages is the host's
/// concern.
pub struct Engine {
    name: String,
    aspects: AspectChain,
    steps: Vec<Arc<dyn Step>>,
    finally_steps: Vec<Arc<dyn Step>>,
    hooks: Option<Arc<dyn LifecycleHooks>>,
    telemetry: Option<Arc<TelemetryRuntime>>,
}

impl Engine {
    /// Starts building an engine.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> EngineBuilder {
        EngineBuilder::new(name)
    }

    pub(crate) fn from_parts(
        name: String,
        aspects: AspectChain,
        steps: Vec<Arc<dyn Step>>,
        finally_steps: Vec<Arc<dyn Step>>,
        hooks: Option<Arc<dyn LifecycleHooks>>,
        telemetry: Option<Arc<TelemetryRuntime>>,
    ) -> Self {
        Self {
            name,
            aspects,
            steps,
            finally_steps,
            hooks,
            telemetry,
        }
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Drives one message through the pipeline.
    ///
    /// The aspect chain wraps the step list; finally-steps always run, even
    /// on failure or stop. A contained failure (see
    /// [`crate::aspects::ErrorContainmentAspect`]) surfaces as a faulted
    /// message status rather than an `Err` here.
    pub async fn invoke(&self, msg: &mut Message) -> Result<(), EngineError> {
        msg.set_pipeline_name(&self.name);
        if let Some(runtime) = &self.telemetry {
            msg.install_telemetry(runtime.clone());
        }

        if let Some(hooks) = &self.hooks {
            hooks.on_start(msg);
        }

        let terminal = EngineTerminal { engine: self };
        let result = self.aspects.run(msg, &terminal).await;

        if let Some(hooks) = &self.hooks {
            match &result {
                Ok(()) => hooks.on_success(msg),
                Err(e) => hooks.on_error(msg, e),
            }
            hooks.on_complete(msg);
        }
        result
    }

    /// The terminal body: pipeline Start event, top-level steps, finally
    /// steps, pipeline End event - the End in a guaranteed path. An emission
    /// configuration error (missing service identity) does not skip the step
    /// list or the finally-steps; it surfaces once the run is over, unless a
    /// step failure takes precedence.
    async fn run_steps(&self, msg: &mut Message) -> Result<(), EngineError> {
        let attributes = msg.state_mut().take_annotations();
        let start_emitted = emit(
            msg,
            TelemetryEvent::new(
                &self.name,
                EventScope::Pipeline,
                EventRole::None,
                EventPhase::Start,
            )
            .with_outcome(EventOutcome::Started)
            .with_attributes(attributes),
        );

        let started = Instant::now();
        let main = run_children(msg, &self.steps).await;
        let finals = self.run_finally(msg).await;
        let result = match (main, finals) {
            (Err(e), _) => Err(e),
            (Ok(()), finals) => finals,
        };

        let duration_ms = started.elapsed().as_secs_f64() * 1000.0;
        let (outcome, reason) = end_outcome(msg, &result);
        let attributes = msg.state_mut().take_annotations();
        let mut end = TelemetryEvent::new(
            &self.name,
            EventScope::Pipeline,
            EventRole::None,
            EventPhase::End,
        )
        .with_outcome(outcome)
        .with_duration_ms(duration_ms)
        .with_attributes(attributes);
        if let Some(reason) = reason {
            end = end.with_reason(reason);
        }
        let end_emitted = emit(msg, end);

        match result {
            Err(e) => Err(e),
            Ok(()) => start_emitted.and(end_emitted),
        }
    }

    /// Runs the finally-steps unconditionally, stop flag or not. The first
    /// failure is kept; later ones are logged so none goes unnoticed.
    async fn run_finally(&self, msg: &mut Message) -> Result<(), EngineError> {
        let mut first_err: Option<EngineError> = None;
        for step in &self.finally_steps {
            if let Err(e) = run_child(msg, step).await {
                if first_err.is_none() {
                    first_err = Some(e);
                } else {
                    tracing::warn!(error = %e, "additional finally-step failure");
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("name", &self.name)
            .field("aspects", &self.aspects.len())
            .field("steps", &self.steps.len())
            .field("finally_steps", &self.finally_steps.len())
            .field("telemetry", &self.telemetry.is_some())
            .finish()
    }
}

struct EngineTerminal<'e> {
    engine: &'e Engine,
}

#[async_trait]
impl TerminalHandler for EngineTerminal<'_> {
    async fn run(&self, msg: &mut Message) -> Result<(), EngineError> {
        self.engine.run_steps(msg).await
    }
}
