//! Bounded-by-stop loops with loop-local break semantics.

use super::instrument::run_children;
use super::{Predicate, Step, StepEmission, StepList};
use crate::errors::EngineError;
use crate::message::Message;
use async_trait::async_trait;
use std::sync::Arc;

/// Runs its body repeatedly until stopped.
///
/// On exit the stop flag is reset, so steps registered after the loop are
/// unaffected - the stop acts as a loop-local "break" and its reason is not
/// retained. A failure propagates without resetting anything.
pub struct Repeat {
    name: String,
    body: StepList,
}

impl Repeat {
    /// Creates an empty loop.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            body: Vec::new(),
        }
    }

    /// Appends a body step.
    #[must_use]
    pub fn step(mut self, step: impl Step + 'static) -> Self {
        self.body.push(Arc::new(step));
        self
    }
}

#[async_trait]
impl Step for Repeat {
    fn name(&self) -> &str {
        &self.name
    }

    fn emission(&self) -> StepEmission {
        StepEmission::Delegating
    }

    async fn execute(&self, msg: &mut Message) -> Result<(), EngineError> {
        // An empty body could never raise a stop; looping on it would spin.
        if self.body.is_empty() {
            return Ok(());
        }
        loop {
            if msg.should_stop() {
                break;
            }
            run_children(msg, &self.body).await?;
            // Keep the loop cooperative even when no body step suspends, so
            // an external cancellation gets a chance to land.
            tokio::task::yield_now().await;
        }
        if msg.state().is_stopped() {
            msg.state_mut().reset_stop();
        }
        Ok(())
    }
}

impl std::fmt::Debug for Repeat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repeat")
            .field("name", &self.name)
            .field("body", &self.body.len())
            .finish()
    }
}

/// Runs its body until a predicate holds or the loop is stopped.
///
/// The predicate is checked first: if it already holds, nothing runs. The
/// stop flag is reset on exit only if the body ran at least once.
pub struct RepeatUntil {
    name: String,
    predicate: Predicate,
    body: StepList,
}

impl RepeatUntil {
    /// Creates a loop with an exit predicate.
    pub fn new<P>(name: impl Into<String>, predicate: P) -> Self
    where
        P: Fn(&Message) -> bool + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            predicate: Arc::new(predicate),
            body: Vec::new(),
        }
    }

    /// Appends a body step.
    #[must_use]
    pub fn step(mut self, step: impl Step + 'static) -> Self {
        self.body.push(Arc::new(step));
        self
    }
}

#[async_trait]
impl Step for RepeatUntil {
    fn name(&self) -> &str {
        &self.name
    }

    fn emission(&self) -> StepEmission {
        StepEmission::Delegating
    }

    async fn execute(&self, msg: &mut Message) -> Result<(), EngineError> {
        if (self.predicate)(msg) {
            return Ok(());
        }
        // With nothing to run, the predicate can never change; bail rather
        // than spin.
        if self.body.is_empty() {
            return Ok(());
        }
        let mut ran = false;
        loop {
            if msg.should_stop() {
                break;
            }
            run_children(msg, &self.body).await?;
            ran = true;
            if (self.predicate)(msg) {
                break;
            }
            tokio::task::yield_now().await;
        }
        if ran && msg.state().is_stopped() {
            msg.state_mut().reset_stop();
        }
        Ok(())
    }
}

impl std::fmt::Debug for RepeatUntil {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepeatUntil")
            .field("name", &self.name)
            .field("body", &self.body.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::steps::FnStep;
    use serde_json::json;

    fn count_then_stop(limit: i64) -> FnStep<impl Fn(&mut Message) -> Result<(), EngineError> + Send + Sync>
    {
        FnStep::new("count", move |msg: &mut Message| {
            let n = msg.get_as::<i64>("count").unwrap_or(0) + 1;
            msg.set("count", json!(n));
            if n >= limit {
                msg.stop("limit reached");
            }
            Ok(())
        })
    }

    #[tokio::test]
    async fn test_repeat_until_stopped_then_resets_flag() {
        let repeat = Repeat::new("loop").step(count_then_stop(3));

        let mut msg = Message::new();
        repeat.execute(&mut msg).await.unwrap();

        assert_eq!(msg.get_as::<i64>("count"), Some(3));
        // Loop-local break: later steps observe a non-stopped state and the
        // triggering reason is gone.
        assert!(!msg.should_stop());
        assert!(msg.stop_reason().is_none());
    }

    #[tokio::test]
    async fn test_repeat_failure_propagates_without_reset() {
        let repeat = Repeat::new("loop").step(FnStep::new("fail", |_msg: &mut Message| {
            Err(EngineError::step("boom"))
        }));

        let mut msg = Message::new();
        let err = repeat.execute(&mut msg).await.unwrap_err();
        assert_eq!(err.to_string(), "boom");
    }

    #[tokio::test]
    async fn test_empty_bodies_return_instead_of_spinning() {
        let mut msg = Message::new();
        let done = tokio::time::timeout(
            std::time::Duration::from_millis(100),
            Repeat::new("loop").execute(&mut msg),
        )
        .await;
        assert!(done.expect("empty repeat must return").is_ok());
        assert!(!msg.should_stop());

        let until = RepeatUntil::new("until", |_: &Message| false);
        let mut msg = Message::new();
        let done = tokio::time::timeout(
            std::time::Duration::from_millis(100),
            until.execute(&mut msg),
        )
        .await;
        assert!(done.expect("empty repeat-until must return").is_ok());
    }

    #[tokio::test]
    async fn test_repeat_until_predicate_already_true_runs_nothing() {
        let until = RepeatUntil::new("until", |_: &Message| true).step(FnStep::new(
            "never",
            |_msg: &mut Message| panic!("body must not run"),
        ));

        let mut msg = Message::new();
        until.execute(&mut msg).await.unwrap();
    }

    #[tokio::test]
    async fn test_repeat_until_exits_on_predicate() {
        let until = RepeatUntil::new("until", |msg: &Message| {
            msg.get_as::<i64>("count").unwrap_or(0) >= 4
        })
        .step(FnStep::new("count", |msg: &mut Message| {
            let n = msg.get_as::<i64>("count").unwrap_or(0) + 1;
            msg.set("count", json!(n));
            Ok(())
        }));

        let mut msg = Message::new();
        until.execute(&mut msg).await.unwrap();
        assert_eq!(msg.get_as::<i64>("count"), Some(4));
        assert!(!msg.should_stop());
    }

    #[tokio::test]
    async fn test_repeat_until_resets_stop_only_if_body_ran() {
        // Body runs once and stops: flag is reset on exit.
        let until = RepeatUntil::new("until", |_: &Message| false).step(count_then_stop(1));
        let mut msg = Message::new();
        until.execute(&mut msg).await.unwrap();
        assert!(!msg.should_stop());

        // Already stopped at entry: body never runs, flag stays raised.
        let until = RepeatUntil::new("until", |_: &Message| false).step(FnStep::new(
            "never",
            |_msg: &mut Message| panic!("body must not run"),
        ));
        let mut msg = Message::new();
        msg.stop("pre-existing stop");
        until.execute(&mut msg).await.unwrap();
        assert!(msg.should_stop());
        assert_eq!(msg.stop_reason().as_deref(), Some("pre-existing stop"));
    }
}
