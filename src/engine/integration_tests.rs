//! End-to-end invocations through a built engine.

use super::*;
use crate::aspects::ErrorContainmentAspect;
use crate::message::{InvokeStatus, ServiceIdentity};
use crate::steps::{
    FnStep, NoOpStep, Retry, Sequence, StopStep, TransactionAdapter, TransactionScope,
};
use crate::telemetry::{CollectingTelemetrySink, TelemetryMode};
use crate::testing::{CountingStep, FailingStep, FlakyStep, RecordingTransactionAdapter};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::atomic::AtomicUsize;

struct OrderRecordingHooks {
    trace: Arc<Mutex<Vec<&'static str>>>,
}

impl LifecycleHooks for OrderRecordingHooks {
    fn on_start(&self, _msg: &Message) {
        self.trace.lock().push("start");
    }

    fn on_success(&self, _msg: &Message) {
        self.trace.lock().push("success");
    }

    fn on_error(&self, _msg: &Message, _error: &EngineError) {
        self.trace.lock().push("error");
    }

    fn on_complete(&self, _msg: &Message) {
        self.trace.lock().push("complete");
    }
}

fn increment(name: &str) -> FnStep<impl Fn(&mut Message) -> Result<(), EngineError> + Send + Sync> {
    FnStep::new(name, |msg: &mut Message| {
        let n = msg.get_as::<i64>("number").unwrap_or(0);
        msg.set("number", json!(n + 1));
        Ok(())
    })
}

fn telemetry_message() -> Message {
    Message::new().with_service_identity(ServiceIdentity::new("svc"))
}

#[tokio::test]
async fn test_hooks_fire_in_order_on_success() {
    let trace = Arc::new(Mutex::new(Vec::new()));
    let t = trace.clone();
    let engine = Engine::builder("orders")
        .step(FnStep::new("mark", move |_msg: &mut Message| {
            t.lock().push("step");
            Ok(())
        }))
        .hooks(OrderRecordingHooks {
            trace: trace.clone(),
        })
        .build();

    let mut msg = Message::new();
    engine.invoke(&mut msg).await.unwrap();

    assert_eq!(*trace.lock(), vec!["start", "step", "success", "complete"]);
    assert_eq!(msg.pipeline_name(), Some("orders"));
}

#[tokio::test]
async fn test_hooks_fire_error_then_complete_on_failure() {
    let trace = Arc::new(Mutex::new(Vec::new()));
    let engine = Engine::builder("orders")
        .step(FailingStep::new("broken", "out of stock"))
        .hooks(OrderRecordingHooks {
            trace: trace.clone(),
        })
        .build();

    let mut msg = Message::new();
    let err = engine.invoke(&mut msg).await.unwrap_err();

    assert_eq!(err.to_string(), "out of stock");
    assert_eq!(*trace.lock(), vec!["start", "error", "complete"]);
}

#[tokio::test]
async fn test_three_increments_run_in_order() {
    let sink = Arc::new(CollectingTelemetrySink::new());
    let engine = Engine::builder("counting")
        .step(increment("first"))
        .step(increment("second"))
        .step(increment("third"))
        .telemetry(TelemetryMode::PipelineAndSteps, sink.clone())
        .build();

    let mut msg = telemetry_message();
    engine.invoke(&mut msg).await.unwrap();

    assert_eq!(msg.get_as::<i64>("number"), Some(3));

    // Two pipeline events plus a Start/End pair per step, none stopped.
    let events = sink.events();
    assert_eq!(events.len(), 8);
    assert!(events.iter().all(|e| e.outcome != EventOutcome::Stopped));
    let end = events.last().unwrap();
    assert_eq!(end.scope, EventScope::Pipeline);
    assert_eq!(end.outcome, EventOutcome::Success);
    // One flush from the auto-registered flush aspect.
    assert_eq!(sink.flush_count(), 1);
}

#[tokio::test]
async fn test_stop_skips_remaining_steps_and_marks_pipeline_stopped() {
    let sink = Arc::new(CollectingTelemetrySink::new());
    let engine = Engine::builder("stopping")
        .step(StopStep::new("halt", "nothing left to do"))
        .step(FnStep::new("never", |_msg: &mut Message| {
            panic!("must not run after a stop");
        }))
        .telemetry(TelemetryMode::PipelineAndSteps, sink.clone())
        .build();

    let mut msg = telemetry_message();
    engine.invoke(&mut msg).await.unwrap();

    assert!(msg.should_stop());
    assert_eq!(msg.stop_reason().as_deref(), Some("nothing left to do"));
    assert!(sink.events_for("never").is_empty());

    let end = sink.events().last().unwrap().clone();
    assert_eq!(end.scope, EventScope::Pipeline);
    assert_eq!(end.outcome, EventOutcome::Stopped);
    assert_eq!(end.reason.as_deref(), Some("nothing left to do"));
}

#[tokio::test]
async fn test_finally_steps_run_after_failure() {
    let count = Arc::new(AtomicUsize::new(0));
    let engine = Engine::builder("cleanup")
        .step(FailingStep::new("broken", "boom"))
        .finally_step(CountingStep::with_counter("teardown", count.clone()))
        .build();

    let mut msg = Message::new();
    let err = engine.invoke(&mut msg).await.unwrap_err();

    assert_eq!(err.to_string(), "boom");
    assert_eq!(count.load(std::sync::atomic::Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_finally_steps_run_after_stop() {
    let count = Arc::new(AtomicUsize::new(0));
    let engine = Engine::builder("cleanup")
        .step(StopStep::new("halt", "done"))
        .finally_step(CountingStep::with_counter("teardown", count.clone()))
        .build();

    let mut msg = Message::new();
    engine.invoke(&mut msg).await.unwrap();
    assert_eq!(count.load(std::sync::atomic::Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_finally_failure_surfaces_only_when_main_run_clean() {
    let engine = Engine::builder("cleanup")
        .step(NoOpStep::new("work"))
        .finally_step(FailingStep::new("teardown", "close failed"))
        .build();

    let mut msg = Message::new();
    let err = engine.invoke(&mut msg).await.unwrap_err();
    assert_eq!(err.to_string(), "close failed");

    // A main-run failure wins over the finally-step's.
    let engine = Engine::builder("cleanup")
        .step(FailingStep::new("broken", "main failure"))
        .finally_step(FailingStep::new("teardown", "close failed"))
        .build();

    let mut msg = Message::new();
    let err = engine.invoke(&mut msg).await.unwrap_err();
    assert_eq!(err.to_string(), "main failure");
}

#[tokio::test]
async fn test_containment_converts_failure_into_faulted_status() {
    let engine = Engine::builder("contained")
        .aspect(ErrorContainmentAspect::new())
        .step(FailingStep::new("broken", "business rule violated"))
        .build();

    let mut msg = Message::new();
    engine.invoke(&mut msg).await.unwrap();

    assert_eq!(
        *msg.status(),
        InvokeStatus::Faulted("business rule violated".into())
    );
}

#[tokio::test]
async fn test_self_emitting_child_owns_its_pair_under_a_parent() {
    let sink = Arc::new(CollectingTelemetrySink::new());
    let engine = Engine::builder("nested")
        .step(
            Sequence::new("outer").step(Retry::new("retry", 1).step(NoOpStep::new("leaf"))),
        )
        .telemetry(TelemetryMode::PipelineAndSteps, sink.clone())
        .build();

    let mut msg = telemetry_message();
    engine.invoke(&mut msg).await.unwrap();

    // The retry owns its pair; the enclosing sequence must not add a
    // duplicate Start/End for it.
    let retry_events = sink.events_for("retry");
    assert_eq!(retry_events.len(), 2);
    assert_eq!(retry_events[0].phase, EventPhase::Start);
    assert_eq!(retry_events[1].phase, EventPhase::End);
    assert_eq!(retry_events[1].outcome, EventOutcome::Success);

    // Two pipeline events, a parent-emitted pair for the sequence, the
    // retry's own pair, and a pair for the leaf: eight in total.
    assert_eq!(sink.events_for("outer").len(), 2);
    assert_eq!(sink.events_for("leaf").len(), 2);
    assert_eq!(sink.len(), 8);
}

#[tokio::test]
async fn test_missing_identity_fails_invocation_when_telemetry_enabled() {
    let sink = Arc::new(CollectingTelemetrySink::new());
    let engine = Engine::builder("orders")
        .step(NoOpStep::new("work"))
        .telemetry(TelemetryMode::PipelineAndSteps, sink.clone())
        .build();

    let mut msg = Message::new();
    let err = engine.invoke(&mut msg).await.unwrap_err();

    assert!(matches!(
        err,
        EngineError::MissingServiceIdentity { ref pipeline } if pipeline == "orders"
    ));
    assert!(sink.is_empty());
}

#[tokio::test]
async fn test_finally_steps_run_despite_missing_identity() {
    let sink = Arc::new(CollectingTelemetrySink::new());
    let count = Arc::new(AtomicUsize::new(0));
    let engine = Engine::builder("orders")
        .step(NoOpStep::new("work"))
        .finally_step(CountingStep::with_counter("teardown", count.clone()))
        .telemetry(TelemetryMode::PipelineAndSteps, sink.clone())
        .build();

    let mut msg = Message::new();
    let err = engine.invoke(&mut msg).await.unwrap_err();

    // The configuration error surfaces, but teardown still happened.
    assert!(matches!(err, EngineError::MissingServiceIdentity { .. }));
    assert_eq!(count.load(std::sync::atomic::Ordering::SeqCst), 1);
    assert!(sink.is_empty());
}

#[tokio::test]
async fn test_nested_sequence_contributes_its_own_pair() {
    let sink = Arc::new(CollectingTelemetrySink::new());
    let engine = Engine::builder("nested")
        .step(
            Sequence::new("inner")
                .step(NoOpStep::new("a"))
                .step(NoOpStep::new("b")),
        )
        .telemetry(TelemetryMode::PipelineAndSteps, sink.clone())
        .build();

    let mut msg = telemetry_message();
    engine.invoke(&mut msg).await.unwrap();

    // Two pipeline events, a structural pair for the sequence, and a business
    // pair per leaf.
    assert_eq!(sink.len(), 8);
    let inner = sink.events_for("inner");
    assert_eq!(inner.len(), 2);
    assert_eq!(inner[0].role, EventRole::Structural);
}

#[tokio::test]
async fn test_pipeline_only_mode_suppresses_step_events() {
    let sink = Arc::new(CollectingTelemetrySink::new());
    let engine = Engine::builder("quiet")
        .step(NoOpStep::new("a"))
        .step(NoOpStep::new("b"))
        .telemetry(TelemetryMode::PipelineOnly, sink.clone())
        .build();

    let mut msg = telemetry_message();
    engine.invoke(&mut msg).await.unwrap();

    let events = sink.events();
    assert_eq!(events.len(), 2);
    assert!(events.iter().all(|e| e.scope == EventScope::Pipeline));
}

#[tokio::test]
async fn test_external_cancellation_skips_remaining_steps() {
    let engine = Engine::builder("cancelled")
        .step(FnStep::new("cancel", |msg: &mut Message| {
            msg.cancellation().cancel("operator abort");
            Ok(())
        }))
        .step(FnStep::new("never", |_msg: &mut Message| {
            panic!("must not run after cancellation");
        }))
        .build();

    let mut msg = Message::new();
    engine.invoke(&mut msg).await.unwrap();

    assert!(msg.should_stop());
    assert!(msg.stop_reason().unwrap().contains("operator abort"));
}

#[tokio::test]
async fn test_retry_around_transaction_recovers_then_commits() {
    let adapter = Arc::new(RecordingTransactionAdapter::new());
    let flaky = Arc::new(FlakyStep::new("flaky_write", 2));
    let engine = Engine::builder("orders")
        .step(
            Retry::new("retry", 3)
                .with_delay(|_, _| std::time::Duration::ZERO)
                .step_arc(Arc::new(
                    TransactionScope::new(
                        "txn",
                        adapter.clone() as Arc<dyn TransactionAdapter>,
                    )
                    .step_arc(flaky.clone() as Arc<dyn crate::steps::Step>),
                )),
        )
        .build();

    let mut msg = Message::new();
    engine.invoke(&mut msg).await.unwrap();

    // Two transient failures roll back; the third attempt commits.
    assert_eq!(flaky.attempts(), 3);
    assert_eq!(adapter.rollbacks(), 2);
    assert_eq!(adapter.commits(), 1);
}

#[tokio::test]
async fn test_telemetry_off_emits_nothing() {
    let sink = Arc::new(CollectingTelemetrySink::new());
    let engine = Engine::builder("silent")
        .step(NoOpStep::new("a"))
        .telemetry(TelemetryMode::Off, sink.clone())
        .build();

    let mut msg = Message::new();
    engine.invoke(&mut msg).await.unwrap();
    assert!(sink.is_empty());
}
