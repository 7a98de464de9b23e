// src/task/descriptor.rs

//! Static task metadata captured at registration time.
//!
//! A [`TaskDescriptor`] records everything the engine needs to know about a
//! task type without instantiating it: its identifier, the module path and
//! source file (consumed by the analyzer), a factory, the declared export
//! names, and any explicitly declared dependencies. Sections carry their
//! candidate list and a selection function instead.

use std::fmt;
use std::sync::Arc;

use crate::args::RunArgs;
use crate::task::{Task, TaskId};

type TaskFactory = fn() -> Arc<dyn Task>;
type SectionSelect = Arc<dyn Fn(&RunArgs) -> TaskId + Send + Sync>;

/// Metadata for one registered concrete task type.
#[derive(Clone)]
pub struct TaskDescriptor {
    id: TaskId,
    type_name: &'static str,
    module_path: &'static str,
    source_file: &'static str,
    factory: TaskFactory,
    exports: Vec<String>,
    declared_deps: Vec<TaskId>,
}

impl TaskDescriptor {
    pub fn new(
        type_name: &'static str,
        module_path: &'static str,
        source_file: &'static str,
        factory: TaskFactory,
    ) -> Self {
        Self {
            id: format!("{module_path}::{type_name}"),
            type_name,
            module_path,
            source_file,
            factory,
            exports: Vec::new(),
            declared_deps: Vec::new(),
        }
    }

    pub fn with_exports(mut self, exports: &[&str]) -> Self {
        self.exports = exports.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Explicitly declared dependencies; unioned with the analyzed set.
    pub fn with_declared_deps(mut self, deps: Vec<TaskId>) -> Self {
        self.declared_deps = deps;
        self
    }

    pub fn id(&self) -> &TaskId {
        &self.id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn module_path(&self) -> &'static str {
        self.module_path
    }

    pub fn source_file(&self) -> &'static str {
        self.source_file
    }

    pub fn exports(&self) -> &[String] {
        &self.exports
    }

    pub fn declared_deps(&self) -> &[TaskId] {
        &self.declared_deps
    }

    pub fn instantiate(&self) -> Arc<dyn Task> {
        (self.factory)()
    }
}

impl fmt::Debug for TaskDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskDescriptor")
            .field("id", &self.id)
            .field("source_file", &self.source_file)
            .field("exports", &self.exports)
            .finish_non_exhaustive()
    }
}

/// Metadata for one registered section: a polymorphic task whose concrete
/// implementation is chosen from `candidates` at graph build time.
#[derive(Clone)]
pub struct SectionDescriptor {
    id: TaskId,
    type_name: &'static str,
    candidates: Vec<TaskId>,
    select: SectionSelect,
}

impl SectionDescriptor {
    pub fn new(
        type_name: &'static str,
        module_path: &'static str,
        candidates: Vec<TaskId>,
        select: SectionSelect,
    ) -> Self {
        Self {
            id: format!("{module_path}::{type_name}"),
            type_name,
            candidates,
            select,
        }
    }

    pub fn id(&self) -> &TaskId {
        &self.id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn candidates(&self) -> &[TaskId] {
        &self.candidates
    }

    /// Pick the implementation for this invocation's arguments.
    pub fn select(&self, args: &RunArgs) -> TaskId {
        (self.select)(args)
    }
}

impl fmt::Debug for SectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SectionDescriptor")
            .field("id", &self.id)
            .field("candidates", &self.candidates)
            .finish_non_exhaustive()
    }
}

/// A node in the registry: either a concrete task or a section.
#[derive(Debug, Clone)]
pub enum TaskNode {
    Task(TaskDescriptor),
    Section(SectionDescriptor),
}

impl TaskNode {
    pub fn id(&self) -> &TaskId {
        match self {
            TaskNode::Task(d) => d.id(),
            TaskNode::Section(d) => d.id(),
        }
    }
}

/// Register a concrete task type.
///
/// Captures the call site's module path and source file, which is why the
/// macro should be invoked next to the task's `impl Task` block. The task
/// type must implement `Default`.
///
/// ```ignore
/// register_task!(Build, exports = ["artifact"]);
/// register_task!(Deploy, exports = [], depends_on = [Build]);
/// register_task!(Noop);
/// ```
#[macro_export]
macro_rules! register_task {
    ($ty:ident) => {
        $crate::register_task!($ty, exports = []);
    };
    ($ty:ident, exports = [$($export:expr),* $(,)?]) => {
        $crate::register_task!($ty, exports = [$($export),*], depends_on = []);
    };
    ($ty:ident, exports = [$($export:expr),* $(,)?], depends_on = [$($dep:ty),* $(,)?]) => {
        impl $crate::task::TaskRef for $ty {
            fn task_id() -> $crate::task::TaskId {
                concat!(module_path!(), "::", stringify!($ty)).to_string()
            }
        }

        impl $crate::task::RegisteredTask for $ty {
            fn descriptor() -> $crate::task::TaskDescriptor {
                $crate::task::TaskDescriptor::new(
                    stringify!($ty),
                    module_path!(),
                    file!(),
                    || ::std::sync::Arc::new(<$ty as ::std::default::Default>::default()),
                )
                .with_exports(&[$($export),*])
                .with_declared_deps(::std::vec![
                    $(<$dep as $crate::task::TaskRef>::task_id()),*
                ])
            }
        }
    };
}

/// Register a section: a marker type standing for one of several candidate
/// tasks, chosen per invocation from the run arguments.
///
/// ```ignore
/// register_section!(Database, candidates = [Postgres, Sqlite], select = |args| {
///     if args.get_bool("embedded").unwrap_or(false) {
///         Sqlite::task_id()
///     } else {
///         Postgres::task_id()
///     }
/// });
/// ```
#[macro_export]
macro_rules! register_section {
    ($ty:ident, candidates = [$($cand:ty),+ $(,)?], select = $select:expr) => {
        impl $crate::task::TaskRef for $ty {
            fn task_id() -> $crate::task::TaskId {
                concat!(module_path!(), "::", stringify!($ty)).to_string()
            }
        }

        impl $crate::task::RegisteredSection for $ty {
            fn descriptor() -> $crate::task::SectionDescriptor {
                $crate::task::SectionDescriptor::new(
                    stringify!($ty),
                    module_path!(),
                    ::std::vec![$(<$cand as $crate::task::TaskRef>::task_id()),+],
                    ::std::sync::Arc::new($select),
                )
            }
        }
    };
}
