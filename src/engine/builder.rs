//! Fluent construction of [`Engine`] definitions.

use super::{Engine, LifecycleHooks};
use crate::aspects::{Aspect, AspectChain, TelemetryFlushAspect};
use crate::steps::Step;
use crate::telemetry::{TelemetryMode, TelemetryPolicy, TelemetryRuntime, TelemetrySink};
use std::sync::Arc;

/// Builds an [`Engine`] from steps, aspects, hooks, and an optional
/// telemetry configuration.
///
/// When telemetry is configured, a [`TelemetryFlushAspect`] is appended as
/// the innermost aspect so batching sinks flush once per invocation.
pub struct EngineBuilder {
    name: String,
    aspects: Vec<Arc<dyn Aspect>>,
    steps: Vec<Arc<dyn Step>>,
    finally_steps: Vec<Arc<dyn Step>>,
    hooks: Option<Arc<dyn LifecycleHooks>>,
    telemetry_mode: Option<TelemetryMode>,
    telemetry_sink: Option<Arc<dyn TelemetrySink>>,
    telemetry_policy: Option<Arc<dyn TelemetryPolicy>>,
}

impl EngineBuilder {
    /// Starts a builder for a pipeline with the given name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            aspects: Vec::new(),
            steps: Vec::new(),
            finally_steps: Vec::new(),
            hooks: None,
            telemetry_mode: None,
            telemetry_sink: None,
            telemetry_policy: None,
        }
    }

    /// Appends a top-level step.
    #[must_use]
    pub fn step(self, step: impl Step + 'static) -> Self {
        self.step_arc(Arc::new(step))
    }

    /// Appends an already-shared top-level step.
    #[must_use]
    pub fn step_arc(mut self, step: Arc<dyn Step>) -> Self {
        self.steps.push(step);
        self
    }

    /// Appends a finally-step; these run after the main list on every
    /// invocation, failure or stop included.
    #[must_use]
    pub fn finally_step(self, step: impl Step + 'static) -> Self {
        self.finally_step_arc(Arc::new(step))
    }

    /// Appends an already-shared finally-step.
    #[must_use]
    pub fn finally_step_arc(mut self, step: Arc<dyn Step>) -> Self {
        self.finally_steps.push(step);
        self
    }

    /// Appends an aspect; registration order is execution order, outermost
    /// first.
    #[must_use]
    pub fn aspect(self, aspect: impl Aspect + 'static) -> Self {
        self.aspect_arc(Arc::new(aspect))
    }

    /// Appends an already-shared aspect.
    #[must_use]
    pub fn aspect_arc(mut self, aspect: Arc<dyn Aspect>) -> Self {
        self.aspects.push(aspect);
        self
    }

    /// Registers lifecycle hooks.
    #[must_use]
    pub fn hooks(mut self, hooks: impl LifecycleHooks + 'static) -> Self {
        self.hooks = Some(Arc::new(hooks));
        self
    }

    /// Enables telemetry with the given verbosity and sink.
    #[must_use]
    pub fn telemetry(mut self, mode: TelemetryMode, sink: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry_mode = Some(mode);
        self.telemetry_sink = Some(sink);
        self
    }

    /// Installs an inclusion policy consulted after the mode filter.
    #[must_use]
    pub fn telemetry_policy(mut self, policy: impl TelemetryPolicy + 'static) -> Self {
        self.telemetry_policy = Some(Arc::new(policy));
        self
    }

    /// Finalizes the definition.
    #[must_use]
    pub fn build(self) -> Engine {
        let mut chain = AspectChain::new();
        for aspect in self.aspects {
            chain.add(aspect);
        }

        let telemetry = match (self.telemetry_mode, self.telemetry_sink) {
            (Some(mode), Some(sink)) => {
                chain.add(Arc::new(TelemetryFlushAspect::new()));
                let mut runtime = TelemetryRuntime::new(mode, sink);
                if let Some(policy) = self.telemetry_policy {
                    runtime = runtime.with_policy(policy);
                }
                Some(Arc::new(runtime))
            }
            _ => None,
        };

        Engine::from_parts(
            self.name,
            chain,
            self.steps,
            self.finally_steps,
            self.hooks,
            telemetry,
        )
    }
}

impl std::fmt::Debug for EngineBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineBuilder")
            .field("name", &self.name)
            .field("steps", &self.steps.len())
            .field("finally_steps", &self.finally_steps.len())
            .field("aspects", &self.aspects.len())
            .finish()
    }
}
