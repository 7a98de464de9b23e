// tests/wrapper_lifecycle.rs

//! Task wrapper state machines: terminal immutability, blocking waits,
//! export gating and reset.

mod common;

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use common::init_tracing;
use taskdag::prelude::*;
use taskdag::task::TaskWrapper;
use taskdag::task::wrapper::ExportFetch;

type TestResult = std::result::Result<(), Box<dyn Error>>;

#[derive(Default)]
struct Inert;

#[async_trait(?Send)]
impl Task for Inert {}
register_task!(Inert, exports = ["value"]);

fn wrapper() -> TaskWrapper {
    TaskWrapper::new(
        Inert::task_id(),
        Arc::new(Inert),
        vec!["value".to_string()],
    )
}

#[test]
fn run_phase_passes_through_the_states_once() -> TestResult {
    init_tracing();

    let w = wrapper();
    assert_eq!(w.run_state(), TaskState::Pending);

    assert!(w.mark_run_running());
    assert_eq!(w.run_state(), TaskState::Running);
    // Running is not pending anymore; a second claim fails.
    assert!(!w.mark_run_running());

    assert!(w.mark_run_completed(Outputs::new().with("value", 1i64)));
    assert_eq!(w.run_state(), TaskState::Completed);
    assert!(w.run_elapsed().is_some());

    // Terminal states never change.
    assert!(!w.mark_run_failed(Arc::new(anyhow::anyhow!("late"))));
    assert!(!w.mark_run_skipped(Arc::new(anyhow::anyhow!("late"))));
    assert_eq!(w.run_state(), TaskState::Completed);

    Ok(())
}

#[test]
fn exports_are_readable_only_after_completion() -> TestResult {
    init_tracing();

    let w = wrapper();
    assert!(matches!(w.export("value"), Err(ExportFetch::NotStarted)));

    w.mark_run_running();
    assert!(matches!(w.export("value"), Err(ExportFetch::StillRunning)));

    w.mark_run_completed(Outputs::new().with("value", 3i64));
    let value = w.export("value").map_err(|e| format!("{e:?}"))?;
    assert_eq!(value.downcast_ref::<i64>(), Some(&3));
    assert!(matches!(w.export("missing"), Err(ExportFetch::Missing)));

    Ok(())
}

#[test]
fn failed_wrappers_reproduce_their_cause() -> TestResult {
    init_tracing();

    let w = wrapper();
    w.mark_run_running();
    let cause: taskdag::SharedCause = Arc::new(anyhow::anyhow!("broken"));
    w.mark_run_failed(Arc::clone(&cause));

    match w.export("value") {
        Err(ExportFetch::TaskFailed(received)) => assert!(Arc::ptr_eq(&received, &cause)),
        Err(other) => panic!("unexpected export error: {other:?}"),
        Ok(_) => panic!("export unexpectedly readable"),
    }

    Ok(())
}

#[test]
fn waiters_block_until_the_phase_is_terminal() -> TestResult {
    init_tracing();

    let w = Arc::new(wrapper());
    let waiter = {
        let w = Arc::clone(&w);
        std::thread::spawn(move || w.wait_for_run_completion())
    };

    // Give the waiter time to actually park.
    std::thread::sleep(Duration::from_millis(20));
    w.mark_run_running();
    w.mark_run_completed(Outputs::new().with("value", 8i64));

    let state = waiter.join().expect("waiter thread");
    assert_eq!(state, TaskState::Completed);

    Ok(())
}

#[test]
fn reset_returns_both_phases_to_pending() -> TestResult {
    init_tracing();

    let w = wrapper();
    w.mark_run_running();
    w.mark_run_completed(Outputs::new().with("value", 2i64));
    w.mark_clean_running();
    w.mark_clean_completed();

    w.reset();
    assert_eq!(w.run_state(), TaskState::Pending);
    assert_eq!(w.clean_state(), TaskState::Pending);
    assert!(w.run_outputs().is_none());
    assert!(w.run_elapsed().is_none());

    Ok(())
}
