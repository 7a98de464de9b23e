// src/errors.rs

//! Crate-wide error types.
//!
//! User task bodies fail with `anyhow::Error`; everything the engine itself
//! raises is a structured variant of [`Error`]. Failure causes are shared
//! between waiters, wrappers and the final aggregate as `Arc<anyhow::Error>`,
//! so deduplication can compare by pointer identity rather than by message.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::task::TaskId;

/// A failure cause shared between every place that observed it.
pub type SharedCause = Arc<anyhow::Error>;

/// Result type for user task bodies (`run` / `clean`).
pub type TaskResult<T> = std::result::Result<T, anyhow::Error>;

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// One entry per strongly connected component (or self-loop) found in
    /// the dependency graph before execution started.
    #[error("{}", format_cycles(.cycles))]
    Cycle { cycles: Vec<Vec<TaskId>> },

    #[error(transparent)]
    Aggregate(#[from] AggregateError),

    #[error(transparent)]
    Abort(#[from] AbortError),

    /// Analyzer failure surfaced in strict mode.
    #[error("failed to analyze task '{task}': {message}")]
    Build { task: TaskId, message: String },

    #[error("task '{0}' is not registered")]
    UnknownTask(TaskId),

    #[error("worker count must be >= 1 (got {0})")]
    InvalidWorkerCount(usize),

    #[error("export '{export}' of task '{task}' is not readable ({state})")]
    ExportUnavailable {
        task: TaskId,
        export: String,
        state: &'static str,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

fn format_cycles(cycles: &[Vec<TaskId>]) -> String {
    let rendered: Vec<String> = cycles
        .iter()
        .map(|scc| format!("{{{}}}", scc.join(", ")))
        .collect();
    format!(
        "circular dependency detected among tasks: {}",
        rendered.join("; ")
    )
}

/// Cooperative abort signal.
///
/// Returning this from a task body sets the global abort flag: tasks that
/// have not started yet fail with the same error, while bodies already
/// running are left to finish on their own.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("task execution aborted")]
pub struct AbortError;

/// One failed task inside an [`AggregateError`].
#[derive(Debug, Clone)]
pub struct TaskFailure {
    pub task: TaskId,
    pub cause: SharedCause,
    /// Recent output lines of the failing task, if an output capture
    /// collaborator was installed. Empty otherwise.
    pub output: Vec<String>,
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.task, self.cause)
    }
}

/// The structured aggregate raised after a run with failures: one entry per
/// distinct underlying cause, attributed to the task that produced it.
#[derive(Debug)]
pub struct AggregateError {
    pub failures: Vec<TaskFailure>,
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} task(s) failed:", self.failures.len())?;
        for failure in &self.failures {
            writeln!(f, "  - {failure}")?;
        }
        Ok(())
    }
}

impl std::error::Error for AggregateError {}

/// Sentinel re-raised inside a task whose dependency failed.
///
/// `cause` is the dependency's own terminal cause, shared by `Arc` so the
/// aggregate can collapse an entire failure chain to one entry.
#[derive(Debug, Clone)]
pub struct DependencyFailed {
    /// The dependency that failed.
    pub task: TaskId,
    pub cause: SharedCause,
}

impl fmt::Display for DependencyFailed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dependency '{}' failed: {}", self.task, self.cause)
    }
}

impl std::error::Error for DependencyFailed {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        let cause: &anyhow::Error = &self.cause;
        Some(AsRef::<dyn std::error::Error + 'static>::as_ref(cause))
    }
}

/// Follow a chain of [`DependencyFailed`] wrappers down to the original
/// cause and the task that produced it.
pub(crate) fn unwrap_failure_chain(task: &TaskId, cause: &SharedCause) -> (TaskId, SharedCause) {
    let mut task = task.clone();
    let mut cause = cause.clone();
    while let Some(dep) = cause.downcast_ref::<DependencyFailed>() {
        task = dep.task.clone();
        let inner = dep.cause.clone();
        cause = inner;
    }
    (task, cause)
}
