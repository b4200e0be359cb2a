//! The shared child-instrumentation routine for structural steps.
//!
//! Every structural step runs its children through [`run_child`] (usually via
//! [`run_children`]), so observable event counts per nesting shape stay
//! identical across Sequence, ForEach, RepeatUntil, and (transitively)
//! TransactionScope and Retry. Factoring the contract here keeps the
//! independently-maintained copies from drifting.

use super::{Step, StepEmission};
use crate::errors::EngineError;
use crate::message::Message;
use crate::telemetry::{
    emit, EventOutcome, EventPhase, EventRole, EventScope, TelemetryEvent,
};
use std::sync::Arc;
use std::time::Instant;

/// Maps a child's emission tag to the role recorded on its events.
fn role_of(child: &Arc<dyn Step>) -> EventRole {
    match child.emission() {
        StepEmission::Plain => EventRole::Business,
        StepEmission::SelfEmitting | StepEmission::Delegating => EventRole::Structural,
    }
}

/// Classifies how a child's run concluded.
///
/// Shared with the self-emitting steps, which build their own End events.
pub(crate) fn end_outcome(
    msg: &Message,
    result: &Result<(), EngineError>,
) -> (EventOutcome, Option<String>) {
    match result {
        Err(e) => (EventOutcome::Exception, Some(e.to_string())),
        Ok(()) if msg.should_stop() => (EventOutcome::Stopped, msg.stop_reason()),
        Ok(()) => (EventOutcome::Success, None),
    }
}

/// Runs one child under the shared instrumentation contract.
///
/// The caller has already established that the message is not stopped. A
/// self-emitting child is invoked bare - it owns both of its events. For any
/// other child this emits a Start event carrying the drained pending
/// annotations, invokes the child, and emits the End event with outcome,
/// elapsed time, and freshly drained annotations on every path; a failure is
/// re-raised after the End event, never swallowed.
///
/// An emission configuration error (missing service identity) never skips the
/// child: the child and any cleanup owed to it still run, and the error
/// surfaces afterwards - unless the child itself failed, in which case the
/// child's failure wins.
pub(crate) async fn run_child(
    msg: &mut Message,
    child: &Arc<dyn Step>,
) -> Result<(), EngineError> {
    if child.emission() == StepEmission::SelfEmitting {
        return child.execute(msg).await;
    }

    let role = role_of(child);
    let attributes = msg.state_mut().take_annotations();
    let start_emitted = emit(
        msg,
        TelemetryEvent::new(child.name(), EventScope::Step, role, EventPhase::Start)
            .with_outcome(EventOutcome::Started)
            .with_attributes(attributes),
    );

    let started = Instant::now();
    let result = child.execute(msg).await;
    let duration_ms = started.elapsed().as_secs_f64() * 1000.0;

    let (outcome, reason) = end_outcome(msg, &result);
    let attributes = msg.state_mut().take_annotations();
    let mut end = TelemetryEvent::new(child.name(), EventScope::Step, role, EventPhase::End)
        .with_outcome(outcome)
        .with_duration_ms(duration_ms)
        .with_attributes(attributes);
    if let Some(reason) = reason {
        end = end.with_reason(reason);
    }
    let end_emitted = emit(msg, end);

    // The child's failure wins over an emission configuration error.
    match result {
        Err(e) => Err(e),
        Ok(()) => start_emitted.and(end_emitted),
    }
}

/// Runs an ordered child list, checking the should-stop predicate before each
/// child. A stop skips the remaining children; the parent still completes its
/// own closing bookkeeping.
pub(crate) async fn run_children(
    msg: &mut Message,
    children: &[Arc<dyn Step>],
) -> Result<(), EngineError> {
    for child in children {
        if msg.should_stop() {
            break;
        }
        run_child(msg, child).await?;
    }
    Ok(())
}
