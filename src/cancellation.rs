//! Cooperative cancellation for in-flight invocations.
//!
//! Cancellation never forcibly aborts a running step. The token feeds the
//! message's should-stop predicate, which structural steps consult between
//! children, and the transaction scope consults again at its commit decision.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

/// Notified once when cancellation is first requested, with the reason.
pub type CancelCallback = Box<dyn Fn(&str) + Send + Sync>;

#[derive(Default)]
struct TokenState {
    reason: Option<String>,
    callbacks: Vec<CancelCallback>,
}

/// An external cancellation signal shared with one or more invocations.
///
/// Cancelling is idempotent: the first reason wins and callbacks fire exactly
/// once. A panicking callback is isolated and logged, never propagated.
#[derive(Default)]
pub struct CancellationToken {
    flagged: AtomicBool,
    state: Mutex<TokenState>,
}

impl CancellationToken {
    /// Creates a live (non-cancelled) token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation with a reason.
    ///
    /// Later calls are ignored; registered callbacks run immediately, after
    /// the token is already observable as cancelled.
    pub fn cancel(&self, reason: impl Into<String>) {
        let reason = reason.into();
        let callbacks = {
            let mut state = self.state.lock();
            if state.reason.is_some() {
                return;
            }
            state.reason = Some(reason.clone());
            self.flagged.store(true, Ordering::SeqCst);
            std::mem::take(&mut state.callbacks)
        };
        // Outside the lock, so a callback may inspect the token freely.
        for callback in &callbacks {
            fire(callback, &reason);
        }
    }

    /// Registers a callback for the moment cancellation is requested.
    ///
    /// On an already-cancelled token the callback fires immediately.
    pub fn on_cancel<F>(&self, callback: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        let reason = {
            let mut state = self.state.lock();
            match &state.reason {
                Some(reason) => reason.clone(),
                None => {
                    state.callbacks.push(Box::new(callback));
                    return;
                }
            }
        };
        let boxed: CancelCallback = Box::new(callback);
        fire(&boxed, &reason);
    }

    /// Returns whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flagged.load(Ordering::SeqCst)
    }

    /// Returns the cancellation reason, if any.
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        self.state.lock().reason.clone()
    }
}

fn fire(callback: &CancelCallback, reason: &str) {
    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| callback(reason)));
    if outcome.is_err() {
        tracing::warn!(reason, "cancellation callback panicked");
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .field("reason", &self.reason())
            .finish()
    }
}
