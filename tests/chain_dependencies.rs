// tests/chain_dependencies.rs

//! Dependencies discovered from source: a two-task chain where the
//! dependent reads the dependency's export through `need`.

mod common;

use std::error::Error;
use std::sync::Arc;

use common::{RecordingObserver, init_tracing};
use taskdag::prelude::*;

type TestResult = std::result::Result<(), Box<dyn Error>>;

#[derive(Default)]
struct Greeting;

#[async_trait(?Send)]
impl Task for Greeting {
    async fn run(&self, _ctx: &TaskContext) -> TaskResult<Outputs> {
        Ok(Outputs::new().with("b", "hi".to_string()))
    }
}
register_task!(Greeting, exports = ["b"]);

#[derive(Default)]
struct Exclaim;

#[async_trait(?Send)]
impl Task for Exclaim {
    async fn run(&self, ctx: &TaskContext) -> TaskResult<Outputs> {
        let base: Arc<String> = ctx.need_as::<Greeting, String>("b").await?;
        Ok(Outputs::new().with("result", format!("{base}!")))
    }
}
register_task!(Exclaim, exports = ["result"]);

#[test]
fn chain_result_flows_through_need() -> TestResult {
    init_tracing();

    let observer = RecordingObserver::new();
    let session = Session::builder()
        .register::<Greeting>()
        .register::<Exclaim>()
        .observer(observer.clone())
        .build();

    let outputs = session.run_with::<Exclaim>(RunArgs::new(), Some(2))?;
    assert_eq!(
        outputs.get::<String>("result").map(String::as_str),
        Some("hi!")
    );

    // The dependency completed before the dependent started running.
    let dep_completed = observer
        .index_of(&Greeting::task_id(), TaskState::Completed, Phase::Run)
        .expect("dependency completion event");
    let root_running = observer
        .index_of(&Exclaim::task_id(), TaskState::Running, Phase::Run)
        .expect("root running event");
    assert!(dep_completed < root_running);

    Ok(())
}

#[test]
fn chain_works_single_threaded() -> TestResult {
    init_tracing();

    let session = Session::builder()
        .register::<Greeting>()
        .register::<Exclaim>()
        .build();

    let outputs = session.run_with::<Exclaim>(RunArgs::new(), Some(1))?;
    assert_eq!(
        outputs.get::<String>("result").map(String::as_str),
        Some("hi!")
    );

    Ok(())
}
