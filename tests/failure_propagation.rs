// tests/failure_propagation.rs

//! Failing dependencies: skip propagation, aggregate shape and cause
//! deduplication.

mod common;

use std::error::Error;

use common::{RecordingObserver, init_tracing};
use taskdag::prelude::*;

type TestResult = std::result::Result<(), Box<dyn Error>>;

#[derive(Default)]
struct Broken;

#[async_trait(?Send)]
impl Task for Broken {
    async fn run(&self, _ctx: &TaskContext) -> TaskResult<Outputs> {
        Err(anyhow::anyhow!("boom"))
    }
}
register_task!(Broken, exports = ["value"]);

#[derive(Default)]
struct NeedsBroken;

#[async_trait(?Send)]
impl Task for NeedsBroken {
    async fn run(&self, ctx: &TaskContext) -> TaskResult<Outputs> {
        let value = ctx.need::<Broken>("value").await?;
        Ok(Outputs::new().with("value", value))
    }
}
register_task!(NeedsBroken);

#[derive(Default)]
struct FarRemoved;

#[async_trait(?Send)]
impl Task for FarRemoved {
    async fn run(&self, ctx: &TaskContext) -> TaskResult<Outputs> {
        ctx.need::<NeedsBroken>("value").await?;
        Ok(Outputs::new())
    }
}
register_task!(FarRemoved);

#[test]
fn dependency_failure_skips_root_and_aggregates_one_cause() -> TestResult {
    init_tracing();

    let observer = RecordingObserver::new();
    let session = Session::builder()
        .register::<Broken>()
        .register::<NeedsBroken>()
        .observer(observer.clone())
        .build();

    let err = session.run::<NeedsBroken>().unwrap_err();
    let taskdag::Error::Aggregate(aggregate) = err else {
        panic!("expected an aggregate error, got: {err}");
    };

    // One failure, attributed to the task that produced the cause.
    assert_eq!(aggregate.failures.len(), 1);
    assert_eq!(aggregate.failures[0].task, Broken::task_id());
    assert_eq!(aggregate.failures[0].cause.to_string(), "boom");

    // The root never started: its dependency failed first.
    assert_eq!(
        observer.transitions_for(&NeedsBroken::task_id(), Phase::Run),
        vec![(TaskState::Pending, TaskState::Skipped)]
    );
    assert_eq!(
        observer.transitions_for(&Broken::task_id(), Phase::Run),
        vec![
            (TaskState::Pending, TaskState::Running),
            (TaskState::Running, TaskState::Failed),
        ]
    );

    Ok(())
}

#[test]
fn transitive_failure_collapses_to_the_original_cause() -> TestResult {
    init_tracing();

    let observer = RecordingObserver::new();
    let session = Session::builder()
        .register::<Broken>()
        .register::<NeedsBroken>()
        .register::<FarRemoved>()
        .observer(observer.clone())
        .build();

    let err = session.run::<FarRemoved>().unwrap_err();
    let taskdag::Error::Aggregate(aggregate) = err else {
        panic!("expected an aggregate error, got: {err}");
    };

    assert_eq!(aggregate.failures.len(), 1);
    assert_eq!(aggregate.failures[0].task, Broken::task_id());

    // Every task above the failure was skipped, never executed.
    let skipped = observer.tasks_reaching(TaskState::Skipped, Phase::Run);
    assert!(skipped.contains(&NeedsBroken::task_id()));
    assert!(skipped.contains(&FarRemoved::task_id()));

    Ok(())
}

/// Minimal output-capture collaborator: serves canned lines per task.
struct CannedCapture;

impl taskdag::OutputCapture for CannedCapture {
    fn recent_lines(&self, task: &TaskId) -> Vec<String> {
        if *task == Broken::task_id() {
            vec!["error: boom".to_string()]
        } else {
            Vec::new()
        }
    }
}

#[test]
fn failures_carry_recent_output_lines_from_the_capture() -> TestResult {
    init_tracing();

    let session = Session::builder()
        .register::<Broken>()
        .register::<NeedsBroken>()
        .output_capture(std::sync::Arc::new(CannedCapture))
        .build();

    let err = session.run::<NeedsBroken>().unwrap_err();
    let taskdag::Error::Aggregate(aggregate) = err else {
        panic!("expected an aggregate error, got: {err}");
    };

    assert_eq!(aggregate.failures.len(), 1);
    assert_eq!(aggregate.failures[0].output, vec!["error: boom".to_string()]);

    Ok(())
}

#[test]
fn failed_task_export_reproduces_the_error() {
    init_tracing();

    let session = Session::builder().register::<Broken>().build();
    let err = session.export::<Broken>("value").unwrap_err();
    assert!(err.to_string().contains("boom") || matches!(err, taskdag::Error::Aggregate(_)));
}
