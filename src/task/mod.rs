// src/task/mod.rs

//! The user-facing task surface: the [`Task`] trait, exported values, and
//! the identifiers the rest of the engine keys on.
//!
//! A task is a user type implementing [`Task`], registered with
//! [`register_task!`](crate::register_task). Its `run` body produces
//! [`Outputs`] (the task's exported values); dependencies are read with
//! `ctx.need::<Dep>("export")`, which is also what the static analyzer
//! looks for when it discovers the dependency graph.

pub mod descriptor;
pub mod registry;
pub mod wrapper;

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::errors::TaskResult;
use crate::pool::context::TaskContext;

pub use descriptor::{SectionDescriptor, TaskDescriptor, TaskNode};
pub use registry::{Registry, WrapperStore};
pub use wrapper::TaskWrapper;

/// Canonical task identifier: the fully-qualified type path
/// (`module::path::TypeName`) captured at registration.
pub type TaskId = String;

/// Unified per-phase task state.
///
/// `Completed`, `Failed` and `Skipped` are terminal and never change;
/// `Skipped` occurs in the run phase only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskState {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::Failed | TaskState::Skipped
        )
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskState::Pending => "pending",
            TaskState::Running => "running",
            TaskState::Completed => "completed",
            TaskState::Failed => "failed",
            TaskState::Skipped => "skipped",
        };
        f.write_str(name)
    }
}

/// A single exported value. Shared by `Arc`, so every reader of the same
/// export observes the identical allocation.
pub type ExportValue = Arc<dyn Any + Send + Sync>;

/// The exported values a task produced from its `run` body, keyed by export
/// name.
#[derive(Clone, Default)]
pub struct Outputs {
    values: HashMap<String, ExportValue>,
}

impl Outputs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: impl Any + Send + Sync) -> Self {
        self.values.insert(name.into(), Arc::new(value));
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Any + Send + Sync) {
        self.values.insert(name.into(), Arc::new(value));
    }

    pub fn value(&self, name: &str) -> Option<ExportValue> {
        self.values.get(name).cloned()
    }

    /// Borrow an export downcast to its concrete type.
    pub fn get<T: Any + Send + Sync>(&self, name: &str) -> Option<&T> {
        self.values.get(name).and_then(|v| v.downcast_ref::<T>())
    }

    /// Clone an export as a typed `Arc`, preserving identity.
    pub fn get_arc<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        self.values
            .get(name)
            .and_then(|v| v.clone().downcast::<T>().ok())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Debug for Outputs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.values.keys()).finish()
    }
}

/// A unit of work.
///
/// Both bodies are optional: the default `run` exports nothing and the
/// default `clean` does nothing. `run` may suspend only inside
/// [`TaskContext::need`]; `clean` bodies never call `need`.
#[async_trait(?Send)]
pub trait Task: Send + Sync + 'static {
    async fn run(&self, _ctx: &TaskContext) -> TaskResult<Outputs> {
        Ok(Outputs::new())
    }

    async fn clean(&self, _ctx: &TaskContext) -> TaskResult<()> {
        Ok(())
    }
}

/// Types usable as graph references: concrete tasks and sections.
///
/// Implemented by [`register_task!`](crate::register_task) and
/// [`register_section!`](crate::register_section); user code never
/// implements this by hand.
pub trait TaskRef: 'static {
    fn task_id() -> TaskId;
}

/// A registered concrete task; provides the descriptor the registry stores.
pub trait RegisteredTask: TaskRef {
    fn descriptor() -> TaskDescriptor;
}

/// A registered polymorphic section; its descriptor carries the candidate
/// list and the selection function.
pub trait RegisteredSection: TaskRef {
    fn descriptor() -> SectionDescriptor;
}
