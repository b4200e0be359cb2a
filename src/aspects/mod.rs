//! Chain-of-responsibility wrappers around the whole step list.
//!
//! Aspects are registered in a fixed order and linked into a chain whose
//! terminal invokes the engine's step list. Each aspect receives the message
//! and a [`Next`] handle; it may act before and after delegating, intercept
//! failures, and substitute message-level sinks for the duration of the call
//! - capturing the previous value and restoring it on the way out, so nested
//! aspects compose without losing earlier registrations.

mod containment;
mod logging;
mod telemetry;

pub use containment::{ErrorCallback, ErrorContainmentAspect};
pub use logging::LoggingAspect;
pub use telemetry::{TelemetryFlushAspect, TelemetryRoutingAspect};

use crate::errors::EngineError;
use crate::message::Message;
use async_trait::async_trait;
use std::sync::Arc;

/// The continuation invoked once the chain is exhausted.
#[async_trait]
pub trait TerminalHandler: Send + Sync {
    /// Runs the work the chain wraps.
    async fn run(&self, msg: &mut Message) -> Result<(), EngineError>;
}

/// A handle to the rest of the chain.
pub struct Next<'a> {
    rest: &'a [Arc<dyn Aspect>],
    terminal: &'a dyn TerminalHandler,
}

impl<'a> Next<'a> {
    /// Delegates to the next aspect, or to the terminal when none remain.
    pub async fn run(self, msg: &mut Message) -> Result<(), EngineError> {
        match self.rest.split_first() {
            Some((first, rest)) => {
                first
                    .invoke(
                        msg,
                        Next {
                            rest,
                            terminal: self.terminal,
                        },
                    )
                    .await
            }
            None => self.terminal.run(msg).await,
        }
    }
}

/// A cross-cutting wrapper around the whole step sequence.
#[async_trait]
pub trait Aspect: Send + Sync {
    /// Returns the aspect's name.
    fn name(&self) -> &str;

    /// Wraps the rest of the chain. Implementations must delegate via
    /// `next.run(msg)` (or deliberately short-circuit) and must restore any
    /// substituted message-level sink on every path out.
    async fn invoke(&self, msg: &mut Message, next: Next<'_>) -> Result<(), EngineError>;
}

/// An ordered chain of aspects; outermost entered (and exited) first.
#[derive(Default)]
pub struct AspectChain {
    aspects: Vec<Arc<dyn Aspect>>,
}

impl AspectChain {
    /// Creates an empty chain.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an aspect; registration order is execution order.
    pub fn add(&mut self, aspect: Arc<dyn Aspect>) {
        self.aspects.push(aspect);
    }

    /// Returns the number of aspects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.aspects.len()
    }

    /// Returns true if the chain is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.aspects.is_empty()
    }

    /// Runs the chain down to the terminal.
    pub async fn run(
        &self,
        msg: &mut Message,
        terminal: &dyn TerminalHandler,
    ) -> Result<(), EngineError> {
        Next {
            rest: &self.aspects,
            terminal,
        }
        .run(msg)
        .await
    }
}

impl std::fmt::Debug for AspectChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AspectChain")
            .field(
                "aspects",
                &self.aspects.iter().map(|a| a.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;

    struct TracingAspect {
        name: String,
        trace: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Aspect for TracingAspect {
        fn name(&self) -> &str {
            &self.name
        }

        async fn invoke(&self, msg: &mut Message, next: Next<'_>) -> Result<(), EngineError> {
            self.trace.lock().push(format!("enter {}", self.name));
            let result = next.run(msg).await;
            self.trace.lock().push(format!("exit {}", self.name));
            result
        }
    }

    struct MarkingTerminal;

    #[async_trait]
    impl TerminalHandler for MarkingTerminal {
        async fn run(&self, msg: &mut Message) -> Result<(), EngineError> {
            msg.set("terminal", json!(true));
            Ok(())
        }
    }

    struct FailingTerminal;

    #[async_trait]
    impl TerminalHandler for FailingTerminal {
        async fn run(&self, _msg: &mut Message) -> Result<(), EngineError> {
            Err(EngineError::step("terminal failed"))
        }
    }

    #[tokio::test]
    async fn test_outermost_entered_and_exited_first() {
        let trace = Arc::new(Mutex::new(Vec::new()));
        let mut chain = AspectChain::new();
        chain.add(Arc::new(TracingAspect {
            name: "outer".into(),
            trace: trace.clone(),
        }));
        chain.add(Arc::new(TracingAspect {
            name: "inner".into(),
            trace: trace.clone(),
        }));

        let mut msg = Message::new();
        chain.run(&mut msg, &MarkingTerminal).await.unwrap();

        assert_eq!(msg.get_as::<bool>("terminal"), Some(true));
        assert_eq!(
            *trace.lock(),
            vec!["enter outer", "enter inner", "exit inner", "exit outer"]
        );
    }

    #[tokio::test]
    async fn test_empty_chain_runs_terminal() {
        let chain = AspectChain::new();
        let mut msg = Message::new();
        chain.run(&mut msg, &MarkingTerminal).await.unwrap();
        assert_eq!(msg.get_as::<bool>("terminal"), Some(true));
    }

    #[tokio::test]
    async fn test_failure_unwinds_through_all_aspects() {
        let trace = Arc::new(Mutex::new(Vec::new()));
        let mut chain = AspectChain::new();
        chain.add(Arc::new(TracingAspect {
            name: "outer".into(),
            trace: trace.clone(),
        }));

        let mut msg = Message::new();
        let err = chain.run(&mut msg, &FailingTerminal).await.unwrap_err();
        assert_eq!(err.to_string(), "terminal failed");
        assert_eq!(*trace.lock(), vec!["enter outer", "exit outer"]);
    }
}
