// tests/sections.rs

//! Sections: runtime-selected implementations, with unselected candidates
//! skipped immediately.

mod common;

use std::error::Error;
use std::sync::Arc;

use common::{RecordingObserver, init_tracing};
use taskdag::prelude::*;

type TestResult = std::result::Result<(), Box<dyn Error>>;

#[derive(Default)]
struct Postgres;

#[async_trait(?Send)]
impl Task for Postgres {
    async fn run(&self, _ctx: &TaskContext) -> TaskResult<Outputs> {
        Ok(Outputs::new().with("dsn", "postgres://prod".to_string()))
    }
}
register_task!(Postgres, exports = ["dsn"]);

#[derive(Default)]
struct Sqlite;

#[async_trait(?Send)]
impl Task for Sqlite {
    async fn run(&self, _ctx: &TaskContext) -> TaskResult<Outputs> {
        Ok(Outputs::new().with("dsn", "sqlite://memory".to_string()))
    }
}
register_task!(Sqlite, exports = ["dsn"]);

struct Database;

register_section!(Database, candidates = [Postgres, Sqlite], select = |args: &RunArgs| {
    if args.get_bool("embedded").unwrap_or(false) {
        Sqlite::task_id()
    } else {
        Postgres::task_id()
    }
});

#[derive(Default)]
struct Connect;

#[async_trait(?Send)]
impl Task for Connect {
    async fn run(&self, ctx: &TaskContext) -> TaskResult<Outputs> {
        let dsn: Arc<String> = ctx.need_as::<Database, String>("dsn").await?;
        Ok(Outputs::new().with("connected", dsn.to_string()))
    }
}
register_task!(Connect);

fn session(observer: Arc<RecordingObserver>) -> Session {
    Session::builder()
        .register::<Postgres>()
        .register::<Sqlite>()
        .register_section::<Database>()
        .register::<Connect>()
        .observer(observer)
        .build()
}

#[test]
fn section_picks_the_selected_candidate() -> TestResult {
    init_tracing();

    let observer = RecordingObserver::new();
    let session = session(observer.clone());

    let args = RunArgs::builder().arg("embedded", true).build();
    let outputs = session.run_with::<Connect>(args, None)?;
    assert_eq!(
        outputs.get::<String>("connected").map(String::as_str),
        Some("sqlite://memory")
    );

    // The unselected candidate was skipped before anything ran.
    assert_eq!(
        observer.transitions_for(&Postgres::task_id(), Phase::Run),
        vec![(TaskState::Pending, TaskState::Skipped)]
    );

    Ok(())
}

#[test]
fn section_defaults_to_the_other_candidate() -> TestResult {
    init_tracing();

    let observer = RecordingObserver::new();
    let session = session(observer.clone());

    let outputs = session.run::<Connect>()?;
    assert_eq!(
        outputs.get::<String>("connected").map(String::as_str),
        Some("postgres://prod")
    );

    assert_eq!(
        observer.transitions_for(&Sqlite::task_id(), Phase::Run),
        vec![(TaskState::Pending, TaskState::Skipped)]
    );

    Ok(())
}
