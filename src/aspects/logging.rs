//! Per-invocation log sink substitution.

use super::{Aspect, Next};
use crate::errors::EngineError;
use crate::message::{LogSink, Message};
use async_trait::async_trait;
use std::sync::Arc;

/// Substitutes the message's "write line" log sink for the duration of the
/// call, restoring the previous sink afterwards on every path out.
pub struct LoggingAspect {
    sink: LogSink,
}

impl LoggingAspect {
    /// Creates a logging aspect with an explicit sink.
    #[must_use]
    pub fn new(sink: LogSink) -> Self {
        Self { sink }
    }

    /// Creates a logging aspect that routes lines through `tracing`.
    #[must_use]
    pub fn tracing() -> Self {
        Self::new(Arc::new(|line: &str| {
            tracing::info!(target: "conveyor::pipeline", "{line}");
        }))
    }
}

#[async_trait]
impl Aspect for LoggingAspect {
    fn name(&self) -> &str {
        "logging"
    }

    async fn invoke(&self, msg: &mut Message, next: Next<'_>) -> Result<(), EngineError> {
        msg.hooks_mut().push_log_sink(self.sink.clone());
        let result = next.run(msg).await;
        msg.hooks_mut().pop_log_sink();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aspects::{AspectChain, TerminalHandler};
    use parking_lot::Mutex;

    struct LoggingTerminal;

    #[async_trait]
    impl TerminalHandler for LoggingTerminal {
        async fn run(&self, msg: &mut Message) -> Result<(), EngineError> {
            msg.log("from the terminal");
            Ok(())
        }
    }

    struct FailingLoggingTerminal;

    #[async_trait]
    impl TerminalHandler for FailingLoggingTerminal {
        async fn run(&self, msg: &mut Message) -> Result<(), EngineError> {
            msg.log("before the failure");
            Err(EngineError::step("boom"))
        }
    }

    fn collecting_sink() -> (LogSink, Arc<Mutex<Vec<String>>>) {
        let lines: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let l = lines.clone();
        let sink: LogSink = Arc::new(move |line: &str| l.lock().push(line.to_string()));
        (sink, lines)
    }

    #[tokio::test]
    async fn test_sink_active_inside_and_restored_after() {
        let (sink, lines) = collecting_sink();
        let mut chain = AspectChain::new();
        chain.add(Arc::new(LoggingAspect::new(sink)));

        let mut msg = Message::new();
        chain.run(&mut msg, &LoggingTerminal).await.unwrap();

        assert_eq!(*lines.lock(), vec!["from the terminal"]);
        assert!(msg.hooks().current_log_sink().is_none());
    }

    #[tokio::test]
    async fn test_restored_on_failure_path() {
        let (sink, lines) = collecting_sink();
        let mut chain = AspectChain::new();
        chain.add(Arc::new(LoggingAspect::new(sink)));

        let mut msg = Message::new();
        let err = chain.run(&mut msg, &FailingLoggingTerminal).await.unwrap_err();
        assert_eq!(err.to_string(), "boom");
        assert_eq!(*lines.lock(), vec!["before the failure"]);
        assert!(msg.hooks().current_log_sink().is_none());
    }

    #[tokio::test]
    async fn test_nested_aspects_compose_with_stack_discipline() {
        let (outer_sink, outer_lines) = collecting_sink();
        let (inner_sink, inner_lines) = collecting_sink();

        let mut chain = AspectChain::new();
        chain.add(Arc::new(LoggingAspect::new(outer_sink)));
        chain.add(Arc::new(LoggingAspect::new(inner_sink)));

        let mut msg = Message::new();
        chain.run(&mut msg, &LoggingTerminal).await.unwrap();

        // The innermost substitution was active at the terminal; the outer
        // registration survived the inner aspect's exit.
        assert_eq!(*inner_lines.lock(), vec!["from the terminal"]);
        assert!(outer_lines.lock().is_empty());
        assert!(msg.hooks().current_log_sink().is_none());
    }
}
