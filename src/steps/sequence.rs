//! Ordered grouping of steps.

use super::instrument::run_children;
use super::{Step, StepEmission, StepList};
use crate::errors::EngineError;
use crate::message::Message;
use async_trait::async_trait;
use std::sync::Arc;

/// Runs its children in registration order, checking the should-stop
/// predicate between children.
pub struct Sequence {
    name: String,
    steps: StepList,
}

impl Sequence {
    /// Creates an empty sequence.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    /// Appends a step.
    #[must_use]
    pub fn step(mut self, step: impl Step + 'static) -> Self {
        self.steps.push(Arc::new(step));
        self
    }

    /// Appends an already-shared step.
    #[must_use]
    pub fn step_arc(mut self, step: Arc<dyn Step>) -> Self {
        self.steps.push(step);
        self
    }

    /// Returns the number of children.
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Returns true if the sequence has no children.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

#[async_trait]
impl Step for Sequence {
    fn name(&self) -> &str {
        &self.name
    }

    fn emission(&self) -> StepEmission {
        StepEmission::Delegating
    }

    async fn execute(&self, msg: &mut Message) -> Result<(), EngineError> {
        run_children(msg, &self.steps).await
    }
}

impl std::fmt::Debug for Sequence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sequence")
            .field("name", &self.name)
            .field("steps", &self.steps.len())
            .finish()
    }
}
