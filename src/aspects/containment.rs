//! Error containment: converts escaped failures into a message status.

use super::{Aspect, Next};
use crate::errors::EngineError;
use crate::message::{InvokeStatus, Message};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::error;

/// Invoked with the message and the contained failure.
pub type ErrorCallback = Arc<dyn Fn(&mut Message, &EngineError) + Send + Sync>;

/// Catches business failures escaping the inner chain, records a faulted
/// status on the message, and invokes an optional error callback.
///
/// Without this aspect the failure escapes the invocation entirely; the core
/// never hides one on its own.
#[derive(Default)]
pub struct ErrorContainmentAspect {
    callback: Option<ErrorCallback>,
}

impl ErrorContainmentAspect {
    /// Creates a containment aspect without a callback.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an error callback.
    #[must_use]
    pub fn with_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&mut Message, &EngineError) + Send + Sync + 'static,
    {
        self.callback = Some(Arc::new(callback));
        self
    }
}

#[async_trait]
impl Aspect for ErrorContainmentAspect {
    fn name(&self) -> &str {
        "error_containment"
    }

    async fn invoke(&self, msg: &mut Message, next: Next<'_>) -> Result<(), EngineError> {
        match next.run(msg).await {
            Ok(()) => Ok(()),
            Err(e) => {
                error!(error = %e, "contained pipeline failure");
                msg.set_status(InvokeStatus::Faulted(e.to_string()));
                if let Some(callback) = &self.callback {
                    callback(msg, &e);
                }
                Ok(())
            }
        }
    }
}
