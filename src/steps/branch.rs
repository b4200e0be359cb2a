//! Conditional and multiway branching.

use super::instrument::{run_child, run_children};
use super::{Step, StepEmission, StepList};
use crate::errors::EngineError;
use crate::message::Message;
use async_trait::async_trait;
use std::sync::Arc;

/// A predicate over the message.
pub type Predicate = Arc<dyn Fn(&Message) -> bool + Send + Sync>;

/// Selects zero or one step to run for the current message.
pub type Selector = Arc<dyn Fn(&Message) -> Option<Arc<dyn Step>> + Send + Sync>;

/// Evaluates a predicate once when reached; runs the then-branch on true,
/// the else-branch (if supplied) on false, and is otherwise a no-op.
pub struct Conditional {
    name: String,
    predicate: Predicate,
    then_steps: StepList,
    else_steps: StepList,
}

impl Conditional {
    /// Creates a conditional with a predicate and empty branches.
    pub fn new<P>(name: impl Into<String>, predicate: P) -> Self
    where
        P: Fn(&Message) -> bool + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            predicate: Arc::new(predicate),
            then_steps: Vec::new(),
            else_steps: Vec::new(),
        }
    }

    /// Appends a step to the then-branch.
    #[must_use]
    pub fn then_step(mut self, step: impl Step + 'static) -> Self {
        self.then_steps.push(Arc::new(step));
        self
    }

    /// Appends a step to the else-branch.
    #[must_use]
    pub fn else_step(mut self, step: impl Step + 'static) -> Self {
        self.else_steps.push(Arc::new(step));
        self
    }
}

#[async_trait]
impl Step for Conditional {
    fn name(&self) -> &str {
        &self.name
    }

    fn emission(&self) -> StepEmission {
        StepEmission::Delegating
    }

    async fn execute(&self, msg: &mut Message) -> Result<(), EngineError> {
        // Evaluated exactly once per pass.
        if (self.predicate)(msg) {
            run_children(msg, &self.then_steps).await
        } else {
            run_children(msg, &self.else_steps).await
        }
    }
}

impl std::fmt::Debug for Conditional {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Conditional")
            .field("name", &self.name)
            .field("then_steps", &self.then_steps.len())
            .field("else_steps", &self.else_steps.len())
            .finish()
    }
}

/// Invokes a selector for zero-or-one step to run.
///
/// The selector may return a [`super::Sequence`] to bundle several steps. No
/// selection is a no-op; an already-stopped message skips without invoking
/// the selector at all.
pub struct Switch {
    name: String,
    selector: Selector,
}

impl Switch {
    /// Creates a multiway branch from a selector.
    pub fn new<S>(name: impl Into<String>, selector: S) -> Self
    where
        S: Fn(&Message) -> Option<Arc<dyn Step>> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            selector: Arc::new(selector),
        }
    }
}

#[async_trait]
impl Step for Switch {
    fn name(&self) -> &str {
        &self.name
    }

    fn emission(&self) -> StepEmission {
        StepEmission::Delegating
    }

    async fn execute(&self, msg: &mut Message) -> Result<(), EngineError> {
        if msg.should_stop() {
            return Ok(());
        }
        match (self.selector)(msg) {
            Some(step) => run_child(msg, &step).await,
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for Switch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Switch").field("name", &self.name).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::steps::{FnStep, Sequence};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn mark(name: &str, value: &'static str) -> FnStep<impl Fn(&mut Message) -> Result<(), EngineError> + Send + Sync>
    {
        FnStep::new(name, move |msg: &mut Message| {
            msg.set("branch", json!(value));
            Ok(())
        })
    }

    #[tokio::test]
    async fn test_then_branch_on_true() {
        let cond = Conditional::new("cond", |msg: &Message| {
            msg.get_as::<bool>("flag").unwrap_or(false)
        })
        .then_step(mark("then", "then"))
        .else_step(mark("else", "else"));

        let mut msg = Message::new();
        msg.set("flag", json!(true));
        cond.execute(&mut msg).await.unwrap();
        assert_eq!(msg.get_as::<String>("branch").as_deref(), Some("then"));
    }

    #[tokio::test]
    async fn test_else_branch_on_false() {
        let cond = Conditional::new("cond", |_: &Message| false)
            .then_step(mark("then", "then"))
            .else_step(mark("else", "else"));

        let mut msg = Message::new();
        cond.execute(&mut msg).await.unwrap();
        assert_eq!(msg.get_as::<String>("branch").as_deref(), Some("else"));
    }

    #[tokio::test]
    async fn test_missing_else_is_noop() {
        let cond = Conditional::new("cond", |_: &Message| false).then_step(mark("then", "then"));

        let mut msg = Message::new();
        cond.execute(&mut msg).await.unwrap();
        assert!(msg.get("branch").is_none());
    }

    #[tokio::test]
    async fn test_predicate_evaluated_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let cond = Conditional::new("cond", move |_: &Message| {
            c.fetch_add(1, Ordering::SeqCst);
            true
        })
        .then_step(mark("then", "then"));

        let mut msg = Message::new();
        cond.execute(&mut msg).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_switch_selects_a_bundle() {
        let switch = Switch::new("route", |msg: &Message| {
            match msg.get_as::<String>("kind").as_deref() {
                Some("pair") => Some(Arc::new(
                    Sequence::new("pair")
                        .step(mark("first", "first"))
                        .step(FnStep::new("second", |msg: &mut Message| {
                            msg.set("second", json!(true));
                            Ok(())
                        })),
                ) as Arc<dyn Step>),
                _ => None,
            }
        });

        let mut msg = Message::new();
        msg.set("kind", json!("pair"));
        switch.execute(&mut msg).await.unwrap();
        assert_eq!(msg.get_as::<bool>("second"), Some(true));
    }

    #[tokio::test]
    async fn test_switch_no_selection_is_noop() {
        let switch = Switch::new("route", |_: &Message| None);
        let mut msg = Message::new();
        switch.execute(&mut msg).await.unwrap();
        assert!(!msg.should_stop());
    }

    #[tokio::test]
    async fn test_switch_skips_selector_when_stopped() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let switch = Switch::new("route", move |_: &Message| {
            c.fetch_add(1, Ordering::SeqCst);
            None
        });

        let mut msg = Message::new();
        msg.stop("already done");
        switch.execute(&mut msg).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
