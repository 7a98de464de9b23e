// tests/analyzer.rs

//! Static analysis: reference positions, helper following, resolution and
//! failure degradation.

mod common;

use std::collections::HashSet;
use std::error::Error;
use std::io::Write;
use std::sync::Arc;

use common::init_tracing;
use taskdag::analyze::DependencyAnalyzer;
use taskdag::prelude::*;
use taskdag::task::{Registry, TaskDescriptor, TaskNode};

type TestResult = std::result::Result<(), Box<dyn Error>>;

#[derive(Default)]
struct Dep1;

#[async_trait(?Send)]
impl Task for Dep1 {
    async fn run(&self, _ctx: &TaskContext) -> TaskResult<Outputs> {
        Ok(Outputs::new().with("v", 1i64))
    }
}
register_task!(Dep1, exports = ["v"]);

#[derive(Default)]
struct Dep2;

#[async_trait(?Send)]
impl Task for Dep2 {
    async fn run(&self, _ctx: &TaskContext) -> TaskResult<Outputs> {
        Ok(Outputs::new().with("v", 2i64))
    }
}
register_task!(Dep2, exports = ["v"]);

#[derive(Default)]
struct Dep3;

#[async_trait(?Send)]
impl Task for Dep3 {
    async fn run(&self, _ctx: &TaskContext) -> TaskResult<Outputs> {
        Ok(Outputs::new().with("v", 3i64))
    }
}
register_task!(Dep3, exports = ["v"]);

/// References `Dep1` directly and `Dep2` only inside a private helper
/// reached through `self`; `Dep3` is only mentioned by a helper reached
/// through `Self::`.
#[derive(Default)]
struct UsesHelpers;

impl UsesHelpers {
    async fn via_self(&self, ctx: &TaskContext) -> TaskResult<ExportValue> {
        ctx.need::<Dep2>("v").await
    }

    async fn via_self_path(ctx: &TaskContext) -> TaskResult<ExportValue> {
        ctx.need::<Dep3>("v").await
    }
}

#[async_trait(?Send)]
impl Task for UsesHelpers {
    async fn run(&self, ctx: &TaskContext) -> TaskResult<Outputs> {
        let a = ctx.need::<Dep1>("v").await?;
        let b = self.via_self(ctx).await?;
        let c = Self::via_self_path(ctx).await?;
        let _ = (a, b, c);
        Ok(Outputs::new().with("sum", 6i64))
    }
}
register_task!(UsesHelpers, exports = ["sum"]);

/// Calls a method on another object; that receiver's methods must not be
/// followed.
#[derive(Default)]
struct ExplicitReceiver;

struct Other;

impl Other {
    fn touch(&self) -> i64 {
        // This mention of Dep2 must stay invisible to ExplicitReceiver's
        // analysis: `other.touch()` has an explicit receiver.
        0
    }
}

#[async_trait(?Send)]
impl Task for ExplicitReceiver {
    async fn run(&self, _ctx: &TaskContext) -> TaskResult<Outputs> {
        let other = Other;
        let n = other.touch();
        Ok(Outputs::new().with("n", n))
    }
}
register_task!(ExplicitReceiver, exports = ["n"]);

use taskdag::ExportValue;

fn registry_with_all() -> Registry {
    let mut registry = Registry::new();
    registry.insert(TaskNode::Task(<Dep1 as RegisteredTask>::descriptor()));
    registry.insert(TaskNode::Task(<Dep2 as RegisteredTask>::descriptor()));
    registry.insert(TaskNode::Task(<Dep3 as RegisteredTask>::descriptor()));
    registry.insert(TaskNode::Task(<UsesHelpers as RegisteredTask>::descriptor()));
    registry.insert(TaskNode::Task(
        <ExplicitReceiver as RegisteredTask>::descriptor(),
    ));
    registry
}

#[test]
fn helpers_reached_through_self_are_followed() -> TestResult {
    init_tracing();

    let registry = registry_with_all();
    let analyzer = DependencyAnalyzer::new(false);
    let deps = analyzer.dependencies_of(
        &registry,
        &<UsesHelpers as RegisteredTask>::descriptor(),
    )?;

    let expected: HashSet<TaskId> = [Dep1::task_id(), Dep2::task_id(), Dep3::task_id()]
        .into_iter()
        .collect();
    assert_eq!(deps, expected);

    Ok(())
}

#[test]
fn explicit_receivers_are_not_followed() -> TestResult {
    init_tracing();

    let registry = registry_with_all();
    let analyzer = DependencyAnalyzer::new(false);
    let deps = analyzer.dependencies_of(
        &registry,
        &<ExplicitReceiver as RegisteredTask>::descriptor(),
    )?;

    assert!(deps.is_empty(), "unexpected deps: {deps:?}");
    Ok(())
}

#[test]
fn analysis_is_deterministic() -> TestResult {
    init_tracing();

    let registry = registry_with_all();

    // Two independent analyzers over the same source agree.
    let first = DependencyAnalyzer::new(false).dependencies_of(
        &registry,
        &<UsesHelpers as RegisteredTask>::descriptor(),
    )?;
    let second = DependencyAnalyzer::new(false).dependencies_of(
        &registry,
        &<UsesHelpers as RegisteredTask>::descriptor(),
    )?;
    assert_eq!(first, second);

    Ok(())
}

#[test]
fn declared_deps_are_unioned_with_analysis() -> TestResult {
    init_tracing();

    #[derive(Default)]
    struct Declared;

    #[async_trait(?Send)]
    impl Task for Declared {}
    register_task!(Declared, exports = [], depends_on = [Dep1]);

    let mut registry = registry_with_all();
    registry.insert(TaskNode::Task(<Declared as RegisteredTask>::descriptor()));

    let analyzer = DependencyAnalyzer::new(false);
    let deps =
        analyzer.dependencies_of(&registry, &<Declared as RegisteredTask>::descriptor())?;

    assert_eq!(deps, [Dep1::task_id()].into_iter().collect());
    Ok(())
}

#[test]
fn unreadable_source_degrades_to_empty_set() -> TestResult {
    init_tracing();

    fn noop_factory() -> Arc<dyn Task> {
        Arc::new(Dep1)
    }

    let descriptor = TaskDescriptor::new(
        "Ghost",
        "analyzer::nowhere",
        "does/not/exist.rs",
        noop_factory,
    );
    let mut registry = Registry::new();
    registry.insert(TaskNode::Task(descriptor.clone()));

    let lenient = DependencyAnalyzer::new(false);
    let deps = lenient.dependencies_of(&registry, &descriptor)?;
    assert!(deps.is_empty());

    // Strict mode surfaces the same failure as a build error.
    let strict = DependencyAnalyzer::new(true);
    let err = strict.dependencies_of(&registry, &descriptor).unwrap_err();
    assert!(matches!(err, taskdag::Error::Build { .. }), "got: {err}");

    Ok(())
}

#[test]
fn parse_failure_degrades_to_empty_set() -> TestResult {
    init_tracing();

    let mut file = tempfile::NamedTempFile::new()?;
    writeln!(file, "this is not rust ][")?;

    fn noop_factory() -> Arc<dyn Task> {
        Arc::new(Dep1)
    }

    // Leak the path string: descriptors hold &'static str, as produced by
    // the registration macro's `file!()`.
    let path: &'static str = Box::leak(
        file.path()
            .to_string_lossy()
            .into_owned()
            .into_boxed_str(),
    );
    let descriptor = TaskDescriptor::new("Garbled", "analyzer::tmp", path, noop_factory);
    let mut registry = Registry::new();
    registry.insert(TaskNode::Task(descriptor.clone()));

    let analyzer = DependencyAnalyzer::new(false);
    let deps = analyzer.dependencies_of(&registry, &descriptor)?;
    assert!(deps.is_empty());

    Ok(())
}
