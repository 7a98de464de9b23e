// src/task/wrapper.rs

//! Per-task lifecycle wrapper.
//!
//! Exactly one wrapper exists per (task type, executor invocation). It owns
//! the task instance and two independent state machines (run and clean),
//! each with its own condition variable. Terminal states never change; each
//! transition broadcasts its condition exactly once.

use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::errors::SharedCause;
use crate::task::{ExportValue, Outputs, Task, TaskId, TaskState};

#[derive(Debug, Default)]
struct PhaseCell {
    state: Option<TaskState>,
    outputs: Option<Outputs>,
    error: Option<SharedCause>,
    started_at: Option<Instant>,
    finished_at: Option<Instant>,
}

impl PhaseCell {
    fn state(&self) -> TaskState {
        self.state.unwrap_or(TaskState::Pending)
    }

    fn reset(&mut self) {
        *self = PhaseCell::default();
    }
}

#[derive(Debug, Default)]
struct WrapperInner {
    run: PhaseCell,
    clean: PhaseCell,
}

/// Run/clean lifecycle state for one task within one invocation.
///
/// The wrapper never starts threads or futures itself; execution is always
/// triggered through the session. It is the object export reads go through.
pub struct TaskWrapper {
    id: TaskId,
    instance: Arc<dyn Task>,
    exports: Vec<String>,
    inner: Mutex<WrapperInner>,
    run_cond: Condvar,
    clean_cond: Condvar,
}

impl TaskWrapper {
    pub fn new(id: TaskId, instance: Arc<dyn Task>, exports: Vec<String>) -> Self {
        Self {
            id,
            instance,
            exports,
            inner: Mutex::new(WrapperInner::default()),
            run_cond: Condvar::new(),
            clean_cond: Condvar::new(),
        }
    }

    pub fn id(&self) -> &TaskId {
        &self.id
    }

    pub fn instance(&self) -> Arc<dyn Task> {
        Arc::clone(&self.instance)
    }

    pub fn declared_exports(&self) -> &[String] {
        &self.exports
    }

    // --- run phase ---

    /// CAS pending -> running. Records the start instant.
    pub fn mark_run_running(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if inner.run.state() != TaskState::Pending {
            return false;
        }
        inner.run.state = Some(TaskState::Running);
        inner.run.started_at = Some(Instant::now());
        drop(inner);
        self.run_cond.notify_all();
        true
    }

    pub fn mark_run_completed(&self, outputs: Outputs) -> bool {
        self.finish_run(TaskState::Completed, Some(outputs), None)
    }

    pub fn mark_run_failed(&self, cause: SharedCause) -> bool {
        self.finish_run(TaskState::Failed, None, Some(cause))
    }

    /// Terminal without execution: the task was in the static graph but a
    /// dependency failed (or it was an unselected section candidate).
    pub fn mark_run_skipped(&self, cause: SharedCause) -> bool {
        self.finish_run(TaskState::Skipped, None, Some(cause))
    }

    fn finish_run(
        &self,
        state: TaskState,
        outputs: Option<Outputs>,
        error: Option<SharedCause>,
    ) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if inner.run.state().is_terminal() {
            return false;
        }
        inner.run.state = Some(state);
        inner.run.outputs = outputs;
        inner.run.error = error;
        inner.run.finished_at = Some(Instant::now());
        drop(inner);
        self.run_cond.notify_all();
        true
    }

    pub fn run_state(&self) -> TaskState {
        self.inner.lock().unwrap().run.state()
    }

    /// The run outputs, readable only once the run phase completed.
    pub fn run_outputs(&self) -> Option<Outputs> {
        let inner = self.inner.lock().unwrap();
        match inner.run.state() {
            TaskState::Completed => inner.run.outputs.clone(),
            _ => None,
        }
    }

    pub fn run_error(&self) -> Option<SharedCause> {
        let inner = self.inner.lock().unwrap();
        match inner.run.state() {
            TaskState::Failed | TaskState::Skipped => inner.run.error.clone(),
            _ => None,
        }
    }

    pub fn run_elapsed(&self) -> Option<Duration> {
        let inner = self.inner.lock().unwrap();
        match (inner.run.started_at, inner.run.finished_at) {
            (Some(start), Some(end)) => Some(end.duration_since(start)),
            _ => None,
        }
    }

    /// Block until the run phase reaches a terminal state.
    pub fn wait_for_run_completion(&self) -> TaskState {
        let inner = self.inner.lock().unwrap();
        let inner = self
            .run_cond
            .wait_while(inner, |i| !i.run.state().is_terminal())
            .unwrap();
        inner.run.state()
    }

    /// Fetch one export by name.
    ///
    /// Readable iff the run phase completed; a failed or skipped task
    /// reproduces its recorded cause, a pending or running one reports the
    /// export as unavailable.
    pub fn export(&self, name: &str) -> Result<ExportValue, ExportFetch> {
        let inner = self.inner.lock().unwrap();
        match inner.run.state() {
            TaskState::Completed => inner
                .run
                .outputs
                .as_ref()
                .and_then(|o| o.value(name))
                .ok_or(ExportFetch::Missing),
            TaskState::Failed | TaskState::Skipped => {
                let cause = inner
                    .run
                    .error
                    .clone()
                    .unwrap_or_else(|| Arc::new(anyhow::anyhow!("task failed")));
                Err(ExportFetch::TaskFailed(cause))
            }
            TaskState::Pending => Err(ExportFetch::NotStarted),
            TaskState::Running => Err(ExportFetch::StillRunning),
        }
    }

    // --- clean phase ---

    pub fn mark_clean_running(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if inner.clean.state() != TaskState::Pending {
            return false;
        }
        inner.clean.state = Some(TaskState::Running);
        inner.clean.started_at = Some(Instant::now());
        drop(inner);
        self.clean_cond.notify_all();
        true
    }

    pub fn mark_clean_completed(&self) -> bool {
        self.finish_clean(TaskState::Completed, None)
    }

    pub fn mark_clean_failed(&self, cause: SharedCause) -> bool {
        self.finish_clean(TaskState::Failed, Some(cause))
    }

    fn finish_clean(&self, state: TaskState, error: Option<SharedCause>) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if inner.clean.state().is_terminal() {
            return false;
        }
        inner.clean.state = Some(state);
        inner.clean.error = error;
        inner.clean.finished_at = Some(Instant::now());
        drop(inner);
        self.clean_cond.notify_all();
        true
    }

    pub fn clean_state(&self) -> TaskState {
        self.inner.lock().unwrap().clean.state()
    }

    pub fn clean_error(&self) -> Option<SharedCause> {
        let inner = self.inner.lock().unwrap();
        match inner.clean.state() {
            TaskState::Failed => inner.clean.error.clone(),
            _ => None,
        }
    }

    pub fn wait_for_clean_completion(&self) -> TaskState {
        let inner = self.inner.lock().unwrap();
        let inner = self
            .clean_cond
            .wait_while(inner, |i| !i.clean.state().is_terminal())
            .unwrap();
        inner.clean.state()
    }

    // --- lifecycle ---

    /// Return both state machines to pending, clearing results, errors and
    /// timings.
    pub fn reset(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.run.reset();
        inner.clean.reset();
        drop(inner);
        self.run_cond.notify_all();
        self.clean_cond.notify_all();
    }
}

/// Why an export read did not produce a value.
#[derive(Debug)]
pub enum ExportFetch {
    Missing,
    NotStarted,
    StillRunning,
    TaskFailed(SharedCause),
}
