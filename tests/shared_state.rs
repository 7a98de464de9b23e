// tests/shared_state.rs

//! Shared coordination state: request outcomes and exactly-once waiter
//! resumption.

mod common;

use std::error::Error;
use std::sync::Arc;

use common::init_tracing;
use taskdag::prelude::*;
use taskdag::state::{RequestOutcome, SharedState, notify_completed, notify_failed};
use taskdag::task::TaskWrapper;
use tokio::sync::oneshot;

type TestResult = std::result::Result<(), Box<dyn Error>>;

#[derive(Default)]
struct Payload;

#[async_trait(?Send)]
impl Task for Payload {}
register_task!(Payload, exports = ["value"]);

fn wrapper() -> Arc<TaskWrapper> {
    Arc::new(TaskWrapper::new(
        Payload::task_id(),
        Arc::new(Payload),
        vec!["value".to_string()],
    ))
}

#[test]
fn request_on_pending_task_asks_the_caller_to_start_it() -> TestResult {
    init_tracing();

    let state = SharedState::new();
    let w = wrapper();
    state.register(&Payload::task_id(), Arc::clone(&w));

    let (tx, _rx) = oneshot::channel();
    let outcome = state.request(&Payload::task_id(), "value", Arc::clone(&w), tx);
    assert!(matches!(outcome, RequestOutcome::Start));

    // Second CAS caller loses.
    assert!(state.mark_running(&Payload::task_id()));
    assert!(!state.mark_running(&Payload::task_id()));

    Ok(())
}

#[test]
fn completed_requests_return_the_wrapper_value_inline() -> TestResult {
    init_tracing();

    let state = SharedState::new();
    let w = wrapper();
    state.register(&Payload::task_id(), Arc::clone(&w));
    state.mark_running(&Payload::task_id());

    w.mark_run_running();
    w.mark_run_completed(Outputs::new().with("value", 5i64));
    let waiters = state.mark_completed(&Payload::task_id());
    assert!(waiters.is_empty());

    let (tx, _rx) = oneshot::channel();
    match state.request(&Payload::task_id(), "value", Arc::clone(&w), tx) {
        RequestOutcome::Completed(value) => {
            assert_eq!(value.downcast_ref::<i64>(), Some(&5));
        }
        _ => panic!("expected a completed outcome"),
    }

    Ok(())
}

#[test]
fn every_waiter_is_resumed_exactly_once() -> TestResult {
    init_tracing();

    let state = SharedState::new();
    let w = wrapper();
    state.register(&Payload::task_id(), Arc::clone(&w));
    state.mark_running(&Payload::task_id());

    let (tx1, mut rx1) = oneshot::channel();
    let (tx2, mut rx2) = oneshot::channel();
    assert!(matches!(
        state.request(&Payload::task_id(), "value", Arc::clone(&w), tx1),
        RequestOutcome::Wait
    ));
    assert!(matches!(
        state.request(&Payload::task_id(), "value", Arc::clone(&w), tx2),
        RequestOutcome::Wait
    ));

    w.mark_run_running();
    w.mark_run_completed(Outputs::new().with("value", 9i64));
    let waiters = state.mark_completed(&Payload::task_id());
    assert_eq!(waiters.len(), 2);

    // A second terminal transition detaches nothing.
    assert!(state.mark_completed(&Payload::task_id()).is_empty());

    notify_completed(&w, waiters);

    for rx in [&mut rx1, &mut rx2] {
        let resume = rx.try_recv()?;
        match resume {
            taskdag::state::WaiterResume::Value(value) => {
                assert_eq!(value.downcast_ref::<i64>(), Some(&9));
            }
            other => panic!("unexpected resume: {other:?}"),
        }
        // Resumed exactly once: the channel is now dead.
        assert!(rx.try_recv().is_err());
    }

    Ok(())
}

#[test]
fn failed_tasks_resume_waiters_with_the_shared_cause() -> TestResult {
    init_tracing();

    let state = SharedState::new();
    let w = wrapper();
    state.register(&Payload::task_id(), Arc::clone(&w));
    state.mark_running(&Payload::task_id());

    let (tx, mut rx) = oneshot::channel();
    assert!(matches!(
        state.request(&Payload::task_id(), "value", Arc::clone(&w), tx),
        RequestOutcome::Wait
    ));

    let cause: taskdag::SharedCause = Arc::new(anyhow::anyhow!("exploded"));
    let waiters = state.mark_failed(&Payload::task_id(), Arc::clone(&cause));
    notify_failed(waiters, &cause);

    match rx.try_recv()? {
        taskdag::state::WaiterResume::Error(received) => {
            assert!(Arc::ptr_eq(&received, &cause));
        }
        other => panic!("unexpected resume: {other:?}"),
    }

    // Later requests observe the recorded error without waiting.
    let (tx, _rx) = oneshot::channel();
    match state.request(&Payload::task_id(), "value", Arc::clone(&w), tx) {
        RequestOutcome::Error(received) => assert!(Arc::ptr_eq(&received, &cause)),
        _ => panic!("expected an error outcome"),
    }

    Ok(())
}

#[test]
fn skip_is_a_no_op_once_the_task_started() -> TestResult {
    init_tracing();

    let state = SharedState::new();
    let w = wrapper();
    state.register(&Payload::task_id(), Arc::clone(&w));

    state.mark_running(&Payload::task_id());
    let cause: taskdag::SharedCause = Arc::new(anyhow::anyhow!("upstream failed"));
    assert!(state.mark_skipped(&Payload::task_id(), cause).is_none());

    Ok(())
}
