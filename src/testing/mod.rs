//! Test doubles: recording adapters and scripted steps.
//!
//! Available outside `cfg(test)` so downstream crates can exercise their own
//! pipelines against the same doubles the crate's tests use.

use crate::errors::EngineError;
use crate::message::Message;
use crate::steps::{
    IsolationLevel, ResourceAdapter, Step, Transaction, TransactionAdapter,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::any::Any;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// A step that counts its executions.
#[derive(Debug)]
pub struct CountingStep {
    name: String,
    count: Arc<AtomicUsize>,
}

impl CountingStep {
    /// Creates a counting step with its own counter.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Creates a counting step incrementing a shared counter.
    #[must_use]
    pub fn with_counter(name: impl Into<String>, count: Arc<AtomicUsize>) -> Self {
        Self {
            name: name.into(),
            count,
        }
    }

    /// Returns the number of executions so far.
    #[must_use]
    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Step for CountingStep {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _msg: &mut Message) -> Result<(), EngineError> {
        self.count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// A step that always fails with the configured error.
pub struct FailingStep {
    name: String,
    error: Box<dyn Fn() -> EngineError + Send + Sync>,
}

impl FailingStep {
    /// Creates a step failing with a plain step error carrying `reason`.
    #[must_use]
    pub fn new(name: impl Into<String>, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self {
            name: name.into(),
            error: Box::new(move || EngineError::step(reason.clone())),
        }
    }

    /// Creates a step failing with errors produced by `factory`.
    pub fn with_error<F>(name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> EngineError + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            error: Box::new(factory),
        }
    }
}

#[async_trait]
impl Step for FailingStep {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _msg: &mut Message) -> Result<(), EngineError> {
        Err((self.error)())
    }
}

impl std::fmt::Debug for FailingStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FailingStep").field("name", &self.name).finish()
    }
}

/// A step that fails a fixed number of times before succeeding; the failures
/// are transient timeouts, so default retry predicates match them.
#[derive(Debug)]
pub struct FlakyStep {
    name: String,
    failures: usize,
    attempts: AtomicUsize,
}

impl FlakyStep {
    /// Creates a step that fails `failures` times, then succeeds forever.
    #[must_use]
    pub fn new(name: impl Into<String>, failures: usize) -> Self {
        Self {
            name: name.into(),
            failures,
            attempts: AtomicUsize::new(0),
        }
    }

    /// Returns the number of executions so far.
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Step for FlakyStep {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _msg: &mut Message) -> Result<(), EngineError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt <= self.failures {
            Err(EngineError::Timeout(format!(
                "{} timed out on attempt {attempt}",
                self.name
            )))
        } else {
            Ok(())
        }
    }
}

/// A transaction adapter recording begins, commits, and rollbacks.
#[derive(Default)]
pub struct RecordingTransactionAdapter {
    begins: AtomicUsize,
    commits: Arc<AtomicUsize>,
    rollbacks: Arc<AtomicUsize>,
    last_isolation: Mutex<Option<IsolationLevel>>,
    fail_begin: bool,
}

impl RecordingTransactionAdapter {
    /// Creates an adapter whose transactions always settle cleanly.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an adapter whose `begin` always fails.
    #[must_use]
    pub fn failing_begin() -> Self {
        Self {
            fail_begin: true,
            ..Self::default()
        }
    }

    /// Returns how many transactions were begun.
    #[must_use]
    pub fn begins(&self) -> usize {
        self.begins.load(Ordering::SeqCst)
    }

    /// Returns how many transactions were committed.
    #[must_use]
    pub fn commits(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    /// Returns how many transactions were rolled back.
    #[must_use]
    pub fn rollbacks(&self) -> usize {
        self.rollbacks.load(Ordering::SeqCst)
    }

    /// Returns the isolation level of the most recent `begin`.
    #[must_use]
    pub fn last_isolation(&self) -> Option<IsolationLevel> {
        *self.last_isolation.lock()
    }
}

#[async_trait]
impl TransactionAdapter for RecordingTransactionAdapter {
    async fn begin(
        &self,
        _msg: &Message,
        isolation: IsolationLevel,
    ) -> Result<Box<dyn Transaction>, EngineError> {
        if self.fail_begin {
            return Err(EngineError::transaction("begin refused"));
        }
        self.begins.fetch_add(1, Ordering::SeqCst);
        *self.last_isolation.lock() = Some(isolation);
        Ok(Box::new(RecordingTransaction {
            commits: self.commits.clone(),
            rollbacks: self.rollbacks.clone(),
        }))
    }
}

struct RecordingTransaction {
    commits: Arc<AtomicUsize>,
    rollbacks: Arc<AtomicUsize>,
}

#[async_trait]
impl Transaction for RecordingTransaction {
    async fn commit(self: Box<Self>) -> Result<(), EngineError> {
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), EngineError> {
        self.rollbacks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// A resource adapter recording opens and closes; handles are plain `u64`s.
#[derive(Default)]
pub struct RecordingResourceAdapter {
    opens: AtomicUsize,
    closes: AtomicUsize,
    fail_open: bool,
}

impl RecordingResourceAdapter {
    /// Creates an adapter that opens and closes cleanly.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an adapter whose `open` always fails.
    #[must_use]
    pub fn failing_open() -> Self {
        Self {
            fail_open: true,
            ..Self::default()
        }
    }

    /// Returns how many handles were opened.
    #[must_use]
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Returns how many handles were closed.
    #[must_use]
    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ResourceAdapter for RecordingResourceAdapter {
    async fn open(&self, _msg: &Message) -> Result<Box<dyn Any + Send>, EngineError> {
        if self.fail_open {
            return Err(EngineError::resource("open refused"));
        }
        let handle = self.opens.fetch_add(1, Ordering::SeqCst) as u64;
        Ok(Box::new(handle))
    }

    async fn close(&self, _handle: Box<dyn Any + Send>) -> Result<(), EngineError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
