//! Per-message flow-control state and telemetry annotations.

use indexmap::IndexMap;
use serde_json::Value;

/// Flow-control flag, stop reason, and pending telemetry annotations for one
/// invocation.
///
/// Invariants:
/// - `stopped` is false at invocation start; once set it stays set until a
///   looping structural step explicitly resets it between iterations.
/// - Any event built from `annotations` drains them with
///   [`take_annotations`](Self::take_annotations) so stale annotations never
///   leak into a later event.
#[derive(Debug, Clone, Default)]
pub struct ExecutionState {
    stopped: bool,
    stop_reason: Option<String>,
    annotations: IndexMap<String, Value>,
}

impl ExecutionState {
    /// Creates a fresh, non-stopped state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises the stop flag with a reason. The first reason wins.
    pub fn stop(&mut self, reason: impl Into<String>) {
        if !self.stopped {
            self.stopped = true;
            self.stop_reason = Some(reason.into());
        }
    }

    /// Returns whether the stop flag is raised.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Returns the stop reason, if any.
    #[must_use]
    pub fn stop_reason(&self) -> Option<&str> {
        self.stop_reason.as_deref()
    }

    /// Clears the stop flag and its reason.
    ///
    /// Only looping structural steps call this, giving loop-local "break"
    /// semantics: steps registered after the loop observe a non-stopped state
    /// and the triggering reason is not retained.
    pub fn reset_stop(&mut self) {
        self.stopped = false;
        self.stop_reason = None;
    }

    /// Attaches a pending annotation for the next telemetry event.
    pub fn annotate(&mut self, key: impl Into<String>, value: Value) {
        self.annotations.insert(key.into(), value);
    }

    /// Drains all pending annotations, leaving the store empty.
    #[must_use]
    pub fn take_annotations(&mut self) -> IndexMap<String, Value> {
        std::mem::take(&mut self.annotations)
    }

    /// Returns whether any annotations are pending.
    #[must_use]
    pub fn has_annotations(&self) -> bool {
        !self.annotations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_starts_unstopped() {
        let state = ExecutionState::new();
        assert!(!state.is_stopped());
        assert!(state.stop_reason().is_none());
    }

    #[test]
    fn test_first_stop_reason_wins() {
        let mut state = ExecutionState::new();
        state.stop("first");
        state.stop("second");

        assert!(state.is_stopped());
        assert_eq!(state.stop_reason(), Some("first"));
    }

    #[test]
    fn test_reset_clears_flag_and_reason() {
        let mut state = ExecutionState::new();
        state.stop("loop break");
        state.reset_stop();

        assert!(!state.is_stopped());
        assert!(state.stop_reason().is_none());
    }

    #[test]
    fn test_take_annotations_drains_in_order() {
        let mut state = ExecutionState::new();
        state.annotate("b", json!(2));
        state.annotate("a", json!(1));

        let taken = state.take_annotations();
        let keys: Vec<&str> = taken.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["b", "a"]);

        assert!(!state.has_annotations());
        assert!(state.take_annotations().is_empty());
    }
}
