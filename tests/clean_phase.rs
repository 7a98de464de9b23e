// tests/clean_phase.rs

//! The clean phase: reverse dependency order, and `run_and_clean` cleaning
//! even after a failed run.

mod common;

use std::error::Error;
use std::sync::Mutex;

use common::{RecordingObserver, init_tracing};
use taskdag::prelude::*;

type TestResult = std::result::Result<(), Box<dyn Error>>;

static CLEAN_LOG: Mutex<Vec<&'static str>> = Mutex::new(Vec::new());

#[derive(Default)]
struct Ground;

#[async_trait(?Send)]
impl Task for Ground {
    async fn run(&self, _ctx: &TaskContext) -> TaskResult<Outputs> {
        Ok(Outputs::new().with("g", 1i64))
    }

    async fn clean(&self, _ctx: &TaskContext) -> TaskResult<()> {
        CLEAN_LOG.lock().unwrap().push("ground");
        Ok(())
    }
}
register_task!(Ground, exports = ["g"]);

#[derive(Default)]
struct Tower;

#[async_trait(?Send)]
impl Task for Tower {
    async fn run(&self, ctx: &TaskContext) -> TaskResult<Outputs> {
        ctx.need::<Ground>("g").await?;
        Ok(Outputs::new().with("t", 2i64))
    }

    async fn clean(&self, _ctx: &TaskContext) -> TaskResult<()> {
        CLEAN_LOG.lock().unwrap().push("tower");
        Ok(())
    }
}
register_task!(Tower, exports = ["t"]);

static FAILING_CLEANS: std::sync::atomic::AtomicUsize = std::sync::atomic::AtomicUsize::new(0);

#[derive(Default)]
struct FailingRun;

#[async_trait(?Send)]
impl Task for FailingRun {
    async fn run(&self, _ctx: &TaskContext) -> TaskResult<Outputs> {
        Err(anyhow::anyhow!("run failed"))
    }

    async fn clean(&self, _ctx: &TaskContext) -> TaskResult<()> {
        FAILING_CLEANS.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Ok(())
    }
}
register_task!(FailingRun);

#[test]
fn clean_runs_dependents_first() -> TestResult {
    init_tracing();

    CLEAN_LOG.lock().unwrap().clear();

    let observer = RecordingObserver::new();
    let session = Session::builder()
        .register::<Ground>()
        .register::<Tower>()
        .observer(observer.clone())
        .build();

    session.clean_with::<Tower>(RunArgs::new(), Some(1))?;

    let log = CLEAN_LOG.lock().unwrap().clone();
    assert_eq!(log, vec!["tower", "ground"]);

    // Both clean lifecycles were observed.
    assert_eq!(
        observer.transitions_for(&Tower::task_id(), Phase::Clean),
        vec![
            (TaskState::Pending, TaskState::Running),
            (TaskState::Running, TaskState::Completed),
        ]
    );
    assert_eq!(
        observer.transitions_for(&Ground::task_id(), Phase::Clean),
        vec![
            (TaskState::Pending, TaskState::Running),
            (TaskState::Running, TaskState::Completed),
        ]
    );

    Ok(())
}

#[test]
fn run_and_clean_cleans_after_a_failed_run() -> TestResult {
    init_tracing();

    let session = Session::builder().register::<FailingRun>().build();

    let err = session.run_and_clean::<FailingRun>().unwrap_err();
    assert!(matches!(err, taskdag::Error::Aggregate(_)), "got: {err}");

    // Clean still executed.
    assert_eq!(FAILING_CLEANS.load(std::sync::atomic::Ordering::SeqCst), 1);

    Ok(())
}
