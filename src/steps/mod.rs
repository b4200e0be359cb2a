//! Step contract and the structural step family.
//!
//! A step is the smallest unit of work: it operates on one mutable message
//! and may suspend. Structural steps wrap other steps and are responsible for
//! invoking them in order while honoring stop signals and emitting telemetry
//! through the shared instrumentation routine in [`instrument`].

mod branch;
pub(crate) mod instrument;
mod iterate;
mod repeat;
mod resource;
mod retry;
mod sequence;
mod transaction;

pub use branch::{Conditional, Predicate, Selector, Switch};
pub use iterate::{CollectionSelector, ForEach, ItemAssigner};
pub use repeat::{Repeat, RepeatUntil};
pub use resource::{ResourceAdapter, ResourceScope};
pub use retry::{DelayFn, OnRetrying, Retry, RetryPredicate};
pub use sequence::Sequence;
pub use transaction::{IsolationLevel, Transaction, TransactionAdapter, TransactionScope};

use crate::errors::EngineError;
use crate::message::Message;
use async_trait::async_trait;
use std::sync::Arc;

/// How a step participates in telemetry emission.
///
/// An explicit tagged variant the instrumentation routine queries, instead of
/// runtime type inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StepEmission {
    /// A leaf step; its parent emits the generic Start/End pair for it.
    #[default]
    Plain,
    /// A structural step that owns its Start/End events; the parent suppresses
    /// the generic pair it would otherwise emit.
    SelfEmitting,
    /// A structural step whose own pair is parent-emitted and which emits
    /// pairs for its children in turn.
    Delegating,
}

/// Unit-of-work contract.
#[async_trait]
pub trait Step: Send + Sync {
    /// Returns the step's name, used as the telemetry component.
    fn name(&self) -> &str;

    /// Returns how this step participates in telemetry emission.
    fn emission(&self) -> StepEmission {
        StepEmission::Plain
    }

    /// Executes the step against the message, mutating it in place.
    async fn execute(&self, msg: &mut Message) -> Result<(), EngineError>;
}

/// A step backed by a synchronous closure.
pub struct FnStep<F>
where
    F: Fn(&mut Message) -> Result<(), EngineError> + Send + Sync,
{
    name: String,
    func: F,
}

impl<F> FnStep<F>
where
    F: Fn(&mut Message) -> Result<(), EngineError> + Send + Sync,
{
    /// Creates a new function-based step.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

#[async_trait]
impl<F> Step for FnStep<F>
where
    F: Fn(&mut Message) -> Result<(), EngineError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, msg: &mut Message) -> Result<(), EngineError> {
        (self.func)(msg)
    }
}

impl<F> std::fmt::Debug for FnStep<F>
where
    F: Fn(&mut Message) -> Result<(), EngineError> + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnStep").field("name", &self.name).finish()
    }
}

/// A step that does nothing.
#[derive(Debug, Clone)]
pub struct NoOpStep {
    name: String,
}

impl NoOpStep {
    /// Creates a new no-op step.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Step for NoOpStep {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _msg: &mut Message) -> Result<(), EngineError> {
        Ok(())
    }
}

/// A step that raises the stop flag with a fixed reason.
#[derive(Debug, Clone)]
pub struct StopStep {
    name: String,
    reason: String,
}

impl StopStep {
    /// Creates a stop step.
    #[must_use]
    pub fn new(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl Step for StopStep {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, msg: &mut Message) -> Result<(), EngineError> {
        msg.stop(self.reason.clone());
        Ok(())
    }
}

/// Boxes a collection of heterogeneous steps for a structural parent.
pub(crate) type StepList = Vec<Arc<dyn Step>>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_fn_step_mutates_message() {
        let step = FnStep::new("set", |msg: &mut Message| {
            msg.set("touched", json!(true));
            Ok(())
        });
        assert_eq!(step.name(), "set");
        assert_eq!(step.emission(), StepEmission::Plain);

        let mut msg = Message::new();
        step.execute(&mut msg).await.unwrap();
        assert_eq!(msg.get_as::<bool>("touched"), Some(true));
    }

    #[tokio::test]
    async fn test_noop_step() {
        let step = NoOpStep::new("noop");
        let mut msg = Message::new();
        step.execute(&mut msg).await.unwrap();
        assert!(!msg.should_stop());
    }

    #[tokio::test]
    async fn test_stop_step_raises_flag() {
        let step = StopStep::new("halt", "business rule says halt");
        let mut msg = Message::new();
        step.execute(&mut msg).await.unwrap();

        assert!(msg.should_stop());
        assert!(msg.stop_reason().unwrap().contains("halt"));
    }
}
