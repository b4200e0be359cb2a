//! Resource scoping: a connection or session open for the duration of a
//! group of steps.

use super::instrument::run_children;
use super::{Step, StepEmission, StepList};
use crate::errors::EngineError;
use crate::message::Message;
use async_trait::async_trait;
use std::any::Any;
use std::sync::Arc;

/// Opens and closes resource handles for a [`ResourceScope`].
///
/// The open/use/close shape is the only contract structural steps depend on.
#[async_trait]
pub trait ResourceAdapter: Send + Sync {
    /// Opens a handle for this invocation.
    async fn open(&self, msg: &Message) -> Result<Box<dyn Any + Send>, EngineError>;

    /// Releases a handle. Called exactly once on every exit path.
    async fn close(&self, handle: Box<dyn Any + Send>) -> Result<(), EngineError>;
}

/// Attaches an open resource handle to the message while its body runs.
///
/// No transactional semantics. The handle is detached and released on every
/// exit path - success, stop, or failure - before this step returns, so later
/// steps never observe a stale handle. Ownership of the handle stays with
/// this scope; body steps borrow it through [`Message::resource`].
pub struct ResourceScope {
    name: String,
    key: String,
    adapter: Arc<dyn ResourceAdapter>,
    body: StepList,
}

impl ResourceScope {
    /// Creates a scope attaching its handle under `key`.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        key: impl Into<String>,
        adapter: Arc<dyn ResourceAdapter>,
    ) -> Self {
        Self {
            name: name.into(),
            key: key.into(),
            adapter,
            body: Vec::new(),
        }
    }

    /// Appends a body step.
    #[must_use]
    pub fn step(mut self, step: impl Step + 'static) -> Self {
        self.body.push(Arc::new(step));
        self
    }

    /// Appends an already-shared body step.
    #[must_use]
    pub fn step_arc(mut self, step: Arc<dyn Step>) -> Self {
        self.body.push(step);
        self
    }
}

#[async_trait]
impl Step for ResourceScope {
    fn name(&self) -> &str {
        &self.name
    }

    fn emission(&self) -> StepEmission {
        StepEmission::Delegating
    }

    async fn execute(&self, msg: &mut Message) -> Result<(), EngineError> {
        let handle = self.adapter.open(msg).await?;
        msg.attach_resource(&self.key, handle);

        let result = run_children(msg, &self.body).await;

        // Deterministic release on every exit path; detach first so later
        // steps never see the handle.
        let close_result = match msg.detach_resource(&self.key) {
            Some(handle) => self.adapter.close(handle).await,
            None => Ok(()),
        };
        match (result, close_result) {
            (Err(e), close) => {
                if let Err(close_err) = close {
                    tracing::warn!(error = %close_err, "resource close failed after body failure");
                }
                Err(e)
            }
            (Ok(()), close) => close,
        }
    }
}

impl std::fmt::Debug for ResourceScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceScope")
            .field("name", &self.name)
            .field("key", &self.key)
            .field("body", &self.body.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::steps::{FnStep, StopStep};
    use crate::testing::RecordingResourceAdapter;

    fn scope(adapter: &Arc<RecordingResourceAdapter>) -> ResourceScope {
        ResourceScope::new("res", "conn", adapter.clone() as Arc<dyn ResourceAdapter>)
    }

    #[tokio::test]
    async fn test_handle_visible_to_body_and_detached_after() {
        let adapter = Arc::new(RecordingResourceAdapter::new());
        let res = scope(&adapter).step(FnStep::new("use", |msg: &mut Message| {
            assert!(msg.resource::<u64>("conn").is_some());
            Ok(())
        }));

        let mut msg = Message::new();
        res.execute(&mut msg).await.unwrap();

        assert_eq!(adapter.opens(), 1);
        assert_eq!(adapter.closes(), 1);
        assert!(msg.resource::<u64>("conn").is_none());
    }

    #[tokio::test]
    async fn test_closed_on_failure_and_error_reraised() {
        let adapter = Arc::new(RecordingResourceAdapter::new());
        let res = scope(&adapter).step(FnStep::new("fail", |_msg: &mut Message| {
            Err(EngineError::step("broken"))
        }));

        let mut msg = Message::new();
        let err = res.execute(&mut msg).await.unwrap_err();

        assert_eq!(err.to_string(), "broken");
        assert_eq!(adapter.closes(), 1);
        assert!(msg.resource::<u64>("conn").is_none());
    }

    #[tokio::test]
    async fn test_closed_on_stop() {
        let adapter = Arc::new(RecordingResourceAdapter::new());
        let res = scope(&adapter).step(StopStep::new("halt", "done"));

        let mut msg = Message::new();
        res.execute(&mut msg).await.unwrap();

        assert_eq!(adapter.closes(), 1);
        assert!(msg.should_stop());
    }

    #[tokio::test]
    async fn test_open_failure_skips_body_and_close() {
        let adapter = Arc::new(RecordingResourceAdapter::failing_open());
        let res = scope(&adapter).step(FnStep::new("never", |_msg: &mut Message| {
            panic!("body must not run when open fails");
        }));

        let mut msg = Message::new();
        let err = res.execute(&mut msg).await.unwrap_err();
        assert!(matches!(err, EngineError::Resource(_)));
        assert_eq!(adapter.closes(), 0);
    }
}
