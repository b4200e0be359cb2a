//! The mutable per-invocation record flowing through a pipeline.
//!
//! A [`Message`] is exclusively owned by one invocation: the caller creates
//! it, every step it passes through may mutate it in place, and it is
//! discarded after the invocation completes. All mutable state lives here, so
//! concurrent invocations of one immutable pipeline definition are safe.

mod hooks;
mod state;

pub use hooks::{HookStack, LogSink};
pub use state::ExecutionState;

use crate::cancellation::CancellationToken;
use crate::telemetry::TelemetryRuntime;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Identity metadata attached to telemetry events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceIdentity {
    /// The logical service name.
    pub service: String,
    /// Service version, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Instance identifier, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
}

impl ServiceIdentity {
    /// Creates an identity with just a service name.
    #[must_use]
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            version: None,
            instance: None,
        }
    }

    /// Sets the service version.
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Sets the instance identifier.
    #[must_use]
    pub fn with_instance(mut self, instance: impl Into<String>) -> Self {
        self.instance = Some(instance.into());
        self
    }
}

/// Outcome status an error-containment aspect records on the message.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum InvokeStatus {
    /// No contained failure.
    #[default]
    Ok,
    /// A business failure was contained; the reason is the error's display.
    Faulted(String),
}

impl InvokeStatus {
    /// Returns true if a failure was contained.
    #[must_use]
    pub fn is_faulted(&self) -> bool {
        matches!(self, Self::Faulted(_))
    }
}

/// The mutable record carried through one pipeline invocation.
pub struct Message {
    correlation_id: Uuid,
    pipeline_name: Option<String>,
    service_identity: Option<ServiceIdentity>,
    /// Invocation input.
    pub input: Value,
    /// Invocation output / result.
    pub output: Value,
    data: HashMap<String, Value>,
    state: ExecutionState,
    commit: bool,
    cancellation: Arc<CancellationToken>,
    resources: HashMap<String, Box<dyn Any + Send>>,
    hooks: HookStack,
    status: InvokeStatus,
    telemetry: Option<Arc<TelemetryRuntime>>,
}

impl Message {
    /// Creates a new message with a fresh correlation id and execution state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            correlation_id: Uuid::new_v4(),
            pipeline_name: None,
            service_identity: None,
            input: Value::Null,
            output: Value::Null,
            data: HashMap::new(),
            state: ExecutionState::new(),
            commit: true,
            cancellation: Arc::new(CancellationToken::new()),
            resources: HashMap::new(),
            hooks: HookStack::new(),
            status: InvokeStatus::Ok,
            telemetry: None,
        }
    }

    /// Sets the invocation input.
    #[must_use]
    pub fn with_input(mut self, input: Value) -> Self {
        self.input = input;
        self
    }

    /// Attaches a service identity for telemetry.
    #[must_use]
    pub fn with_service_identity(mut self, identity: ServiceIdentity) -> Self {
        self.service_identity = Some(identity);
        self
    }

    /// Shares an external cancellation token with this invocation.
    #[must_use]
    pub fn with_cancellation(mut self, token: Arc<CancellationToken>) -> Self {
        self.cancellation = token;
        self
    }

    /// Returns the correlation id.
    #[must_use]
    pub fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    /// Returns the pipeline name stamped by the engine, if any.
    #[must_use]
    pub fn pipeline_name(&self) -> Option<&str> {
        self.pipeline_name.as_deref()
    }

    pub(crate) fn set_pipeline_name(&mut self, name: impl Into<String>) {
        self.pipeline_name = Some(name.into());
    }

    /// Returns the service identity, if present.
    #[must_use]
    pub fn service_identity(&self) -> Option<&ServiceIdentity> {
        self.service_identity.as_ref()
    }

    /// Sets the service identity.
    pub fn set_service_identity(&mut self, identity: ServiceIdentity) {
        self.service_identity = Some(identity);
    }

    /// Returns a data value by key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Returns a data value deserialized into `T`.
    #[must_use]
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.data
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Sets a data value.
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.data.insert(key.into(), value);
    }

    /// Removes a data value.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.data.remove(key)
    }

    /// Returns the execution state.
    #[must_use]
    pub fn state(&self) -> &ExecutionState {
        &self.state
    }

    /// Returns the execution state mutably.
    pub fn state_mut(&mut self) -> &mut ExecutionState {
        &mut self.state
    }

    /// Raises the stop flag with a reason.
    pub fn stop(&mut self, reason: impl Into<String>) {
        self.state.stop(reason);
    }

    /// The combined should-stop predicate: stop flag or external cancellation.
    #[must_use]
    pub fn should_stop(&self) -> bool {
        self.state.is_stopped() || self.cancellation.is_cancelled()
    }

    /// Returns the stop or cancellation reason, stop flag first.
    #[must_use]
    pub fn stop_reason(&self) -> Option<String> {
        self.state
            .stop_reason()
            .map(str::to_string)
            .or_else(|| self.cancellation.reason())
    }

    /// Returns the transactional commit flag (defaults to true).
    #[must_use]
    pub fn commit(&self) -> bool {
        self.commit
    }

    /// Sets the transactional commit flag.
    pub fn set_commit(&mut self, commit: bool) {
        self.commit = commit;
    }

    /// Returns the cancellation token.
    #[must_use]
    pub fn cancellation(&self) -> &Arc<CancellationToken> {
        &self.cancellation
    }

    /// Attaches a resource handle under a key.
    ///
    /// Ownership stays with the structural step that created the handle; it
    /// must be the one to detach and release it.
    pub fn attach_resource(&mut self, key: impl Into<String>, handle: Box<dyn Any + Send>) {
        self.resources.insert(key.into(), handle);
    }

    /// Detaches a resource handle, removing it from the message.
    pub fn detach_resource(&mut self, key: &str) -> Option<Box<dyn Any + Send>> {
        self.resources.remove(key)
    }

    /// Returns a typed view of an attached resource handle.
    #[must_use]
    pub fn resource<T: Any>(&self, key: &str) -> Option<&T> {
        self.resources.get(key).and_then(|h| h.downcast_ref::<T>())
    }

    /// Returns the hook stacks.
    #[must_use]
    pub fn hooks(&self) -> &HookStack {
        &self.hooks
    }

    /// Returns the hook stacks mutably.
    pub fn hooks_mut(&mut self) -> &mut HookStack {
        &mut self.hooks
    }

    /// Writes a log line via the active log sink, falling back to `tracing`.
    pub fn log(&self, line: &str) {
        if let Some(sink) = self.hooks.current_log_sink() {
            sink(line);
        } else {
            tracing::info!(target: "conveyor::message", "{line}");
        }
    }

    /// Returns the invocation status.
    #[must_use]
    pub fn status(&self) -> &InvokeStatus {
        &self.status
    }

    /// Sets the invocation status.
    pub fn set_status(&mut self, status: InvokeStatus) {
        self.status = status;
    }

    pub(crate) fn install_telemetry(&mut self, runtime: Arc<TelemetryRuntime>) {
        self.telemetry = Some(runtime);
    }

    /// Returns the telemetry runtime installed by the engine, if any.
    #[must_use]
    pub fn telemetry_runtime(&self) -> Option<Arc<TelemetryRuntime>> {
        self.telemetry.clone()
    }
}

impl Default for Message {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Message")
            .field("correlation_id", &self.correlation_id)
            .field("pipeline_name", &self.pipeline_name)
            .field("service_identity", &self.service_identity)
            .field("state", &self.state)
            .field("commit", &self.commit)
            .field("status", &self.status)
            .field("resources", &self.resources.keys().collect::<Vec<_>>())
            .finish()
    }
}
