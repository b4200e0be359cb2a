//! Error types for the conveyor engine.
//!
//! Stops are deliberately *not* errors: a stop is a cooperative short-circuit
//! signal carried on the message's [`crate::message::ExecutionState`], while
//! everything in [`EngineError`] propagates through structural steps until an
//! error-containment aspect catches it or it escapes the invocation.

use thiserror::Error;

/// The main error type for pipeline execution.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A business failure raised by a leaf step.
    #[error("{0}")]
    Step(String),

    /// A timeout signature, eligible for retry.
    #[error("timeout: {0}")]
    Timeout(String),

    /// A deadlock signature, eligible for retry.
    #[error("deadlock: {0}")]
    Deadlock(String),

    /// A transport-level failure, eligible for retry.
    #[error("transport error: {0}")]
    Transport(String),

    /// Cooperative cancellation observed at a critical decision point.
    #[error("cancelled: {0}")]
    Cancelled(String),

    /// Telemetry was enabled but the message carries no service identity.
    ///
    /// Raised at emission time, never silently ignored.
    #[error("telemetry is enabled for pipeline '{pipeline}' but the message has no service identity")]
    MissingServiceIdentity {
        /// The pipeline whose emission failed.
        pipeline: String,
    },

    /// A resource adapter failed to open or close a handle.
    #[error("resource error: {0}")]
    Resource(String),

    /// A transactional resource failed to begin, commit, or roll back.
    #[error("transaction error: {0}")]
    Transaction(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Creates a business failure from a leaf step.
    #[must_use]
    pub fn step(message: impl Into<String>) -> Self {
        Self::Step(message.into())
    }

    /// Creates a resource adapter failure.
    #[must_use]
    pub fn resource(message: impl Into<String>) -> Self {
        Self::Resource(message.into())
    }

    /// Creates a transactional resource failure.
    #[must_use]
    pub fn transaction(message: impl Into<String>) -> Self {
        Self::Transaction(message.into())
    }

    /// Returns true for the transient class the default retry predicate matches:
    /// timeouts, deadlocks, and transport failures.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout(_) | Self::Deadlock(_) | Self::Transport(_)
        )
    }

    /// Returns true if this error represents cooperative cancellation.
    #[must_use]
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(EngineError::Timeout("t".into()).is_transient());
        assert!(EngineError::Deadlock("d".into()).is_transient());
        assert!(EngineError::Transport("x".into()).is_transient());
        assert!(!EngineError::Step("boom".into()).is_transient());
        assert!(!EngineError::Cancelled("c".into()).is_transient());
    }

    #[test]
    fn test_display() {
        let err = EngineError::step("validation failed");
        assert_eq!(err.to_string(), "validation failed");

        let err = EngineError::MissingServiceIdentity {
            pipeline: "orders".into(),
        };
        assert!(err.to_string().contains("orders"));
    }

    #[test]
    fn test_cancellation_classification() {
        assert!(EngineError::Cancelled("shutdown".into()).is_cancellation());
        assert!(!EngineError::Timeout("t".into()).is_cancellation());
    }
}
