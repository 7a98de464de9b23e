// src/pool/context.rs

//! The execution context handed to task bodies.
//!
//! `need` is the only suspension point a body has: it resolves a
//! dependency's export through the shared state, starting the dependency on
//! this same worker if nobody has yet, or parking until whoever owns it
//! finishes. The current task's identity is kept in a task-local so
//! output-routing collaborators can attribute text to the right task.

use std::any::Any;
use std::future::Future;
use std::sync::Arc;

use anyhow::anyhow;
use tokio::sync::oneshot;
use tracing::debug;

use crate::args::RunArgs;
use crate::errors::{DependencyFailed, TaskResult};
use crate::events::Phase;
use crate::pool::RunEnv;
use crate::pool::driver::drive_run;
use crate::state::{RequestOutcome, WaiterResume};
use crate::task::{ExportValue, TaskId, TaskRef};

tokio::task_local! {
    /// Identity of the task whose body the current future belongs to.
    pub(crate) static CURRENT_TASK: TaskId;
}

/// The task currently executing on this worker, if any. Installed before a
/// body is entered and restored on every exit path.
pub fn current_task() -> Option<TaskId> {
    CURRENT_TASK.try_with(|task| task.clone()).ok()
}

/// Per-body execution context.
pub struct TaskContext {
    env: RunEnv,
    task: TaskId,
    phase: Phase,
}

impl TaskContext {
    pub(crate) fn new(env: RunEnv, task: TaskId, phase: Phase) -> Self {
        Self { env, task, phase }
    }

    /// The invocation's read-only argument map.
    pub fn args(&self) -> &RunArgs {
        &self.env.args
    }

    /// The identity of the task this context belongs to.
    pub fn task_id(&self) -> &TaskId {
        &self.task
    }

    /// Fetch an export of another task, suspending until it is available.
    ///
    /// Resolves through the shared state: an already-completed dependency
    /// returns inline; a failed one re-raises its cause here; a running one
    /// parks this body until completion; an unstarted one is begun on this
    /// same worker first.
    pub async fn need<D: TaskRef>(&self, export: &str) -> TaskResult<ExportValue> {
        self.need_by_id(D::task_id(), export).await
    }

    /// `need` plus a typed downcast of the export value.
    pub async fn need_as<D: TaskRef, T: Any + Send + Sync>(
        &self,
        export: &str,
    ) -> TaskResult<Arc<T>> {
        let value = self.need::<D>(export).await?;
        value.downcast::<T>().map_err(|_| {
            anyhow!(
                "export '{export}' of task '{}' has an unexpected type",
                D::task_id()
            )
        })
    }

    async fn need_by_id(&self, target: TaskId, export: &str) -> TaskResult<ExportValue> {
        if self.phase == Phase::Clean {
            return Err(anyhow!("need() is not available from clean bodies"));
        }

        // Section references resolve to the implementation selected at
        // graph build.
        let target = self
            .env
            .sections
            .get(&target)
            .cloned()
            .unwrap_or(target);

        if target == self.task {
            return Err(anyhow!("task '{target}' depends on itself"));
        }

        // Resolving the wrapper also validates that the target is a
        // registered task at all.
        let wrapper = self
            .env
            .wrappers
            .get_or_create(&target)
            .map_err(|err| anyhow!(err.to_string()))?;

        let (resume_tx, resume_rx) = oneshot::channel();
        match self.env.shared.request(&target, export, wrapper, resume_tx) {
            RequestOutcome::Completed(value) => Ok(value),
            RequestOutcome::Error(cause) => Err(anyhow::Error::new(DependencyFailed {
                task: target,
                cause,
            })),
            RequestOutcome::Wait => self.await_resume(resume_rx, target).await,
            RequestOutcome::Start => {
                debug!(task = %self.task, dep = %target, "starting dependency on this worker");
                tokio::task::spawn_local(drive_run(self.env.clone(), target.clone()));
                self.await_resume(resume_rx, target).await
            }
        }
    }

    async fn await_resume(
        &self,
        resume_rx: oneshot::Receiver<WaiterResume>,
        target: TaskId,
    ) -> TaskResult<ExportValue> {
        match resume_rx.await {
            Ok(WaiterResume::Value(value)) => Ok(value),
            Ok(WaiterResume::Error(cause)) => Err(anyhow::Error::new(DependencyFailed {
                task: target,
                cause,
            })),
            // The sender side is dropped only if the run was torn down
            // while this body was parked.
            Err(_) => Err(anyhow!(
                "dependency '{target}' terminated without resuming this request"
            )),
        }
    }

    /// Open a named sub-span inside this body. The completion marker is
    /// emitted on every exit, including when the inner future resolves to
    /// an error.
    pub async fn group<T, F>(&self, name: &str, fut: F) -> T
    where
        F: Future<Output = T>,
    {
        self.env.events.group_started(&self.task, name, self.phase);
        let out = fut.await;
        self.env
            .events
            .group_completed(&self.task, name, self.phase);
        out
    }
}
