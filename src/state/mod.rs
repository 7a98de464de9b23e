// src/state/mod.rs

//! Shared cross-worker coordination state.
//!
//! One mutex-serialized map of task -> (state, wrapper, error, waiters) is
//! the sole mediator between workers. The mutex is held only for state
//! reads and writes, never across user code: terminal transitions detach
//! the waiter list under the lock and the caller fans the notifications out
//! after releasing it. Every waiter is resumed exactly once, with either
//! the requested value or the failure cause.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;
use tracing::debug;

use crate::errors::SharedCause;
use crate::task::wrapper::ExportFetch;
use crate::task::{ExportValue, TaskId, TaskWrapper};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecordState {
    Pending,
    Running,
    Completed,
    Error,
}

/// What a parked requester receives when its dependency reaches a terminal
/// state.
pub enum WaiterResume {
    Value(ExportValue),
    Error(SharedCause),
}

impl std::fmt::Debug for WaiterResume {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WaiterResume::Value(_) => f.write_str("WaiterResume::Value(..)"),
            WaiterResume::Error(cause) => write!(f, "WaiterResume::Error({cause})"),
        }
    }
}

/// A parked dependency request: which export was asked for, and the oneshot
/// that resumes the requesting task. The requesting future lives on the
/// worker that parked it, so completion is always polled there.
pub struct Waiter {
    export: String,
    resume: oneshot::Sender<WaiterResume>,
}

struct Record {
    state: RecordState,
    wrapper: Arc<TaskWrapper>,
    error: Option<SharedCause>,
    waiters: Vec<Waiter>,
}

/// Outcome of a dependency request.
pub enum RequestOutcome {
    /// Dependency already completed; the value was fetched via its wrapper.
    Completed(ExportValue),
    /// Dependency already failed (or was skipped); re-raise its cause.
    Error(SharedCause),
    /// Dependency is running; the waiter was appended.
    Wait,
    /// Dependency has not started; the waiter was appended and the caller
    /// should start it on its own worker.
    Start,
}

/// The single synchronized structure mediating between workers.
#[derive(Default)]
pub struct SharedState {
    records: Mutex<HashMap<TaskId, Record>>,
}

impl SharedState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent: records the wrapper and a pending state if absent.
    pub fn register(&self, task: &TaskId, wrapper: Arc<TaskWrapper>) {
        let mut records = self.records.lock().unwrap();
        records.entry(task.clone()).or_insert_with(|| Record {
            state: RecordState::Pending,
            wrapper,
            error: None,
            waiters: Vec::new(),
        });
    }

    /// CAS pending -> running. False means the task is already past
    /// pending and the caller must not execute it.
    pub fn mark_running(&self, task: &str) -> bool {
        let mut records = self.records.lock().unwrap();
        match records.get_mut(task) {
            Some(record) if record.state == RecordState::Pending => {
                record.state = RecordState::Running;
                true
            }
            _ => false,
        }
    }

    /// Terminal success; detaches and returns the waiter list for fan-out
    /// outside the lock.
    pub fn mark_completed(&self, task: &str) -> Vec<Waiter> {
        let mut records = self.records.lock().unwrap();
        match records.get_mut(task) {
            Some(record) if record.state != RecordState::Completed
                && record.state != RecordState::Error =>
            {
                record.state = RecordState::Completed;
                std::mem::take(&mut record.waiters)
            }
            _ => Vec::new(),
        }
    }

    /// Terminal failure; records the cause and detaches the waiters.
    pub fn mark_failed(&self, task: &str, cause: SharedCause) -> Vec<Waiter> {
        let mut records = self.records.lock().unwrap();
        match records.get_mut(task) {
            Some(record) if record.state != RecordState::Completed
                && record.state != RecordState::Error =>
            {
                record.state = RecordState::Error;
                record.error = Some(cause);
                std::mem::take(&mut record.waiters)
            }
            _ => Vec::new(),
        }
    }

    /// CAS pending -> terminal-with-error, used for skip propagation.
    ///
    /// Returns the detached waiters on success and `None` if the task
    /// already started (its own completion will handle everything).
    pub fn mark_skipped(&self, task: &str, cause: SharedCause) -> Option<Vec<Waiter>> {
        let mut records = self.records.lock().unwrap();
        match records.get_mut(task) {
            Some(record) if record.state == RecordState::Pending => {
                record.state = RecordState::Error;
                record.error = Some(cause);
                Some(std::mem::take(&mut record.waiters))
            }
            _ => None,
        }
    }

    /// Resolve a dependency request from a running task.
    ///
    /// A task the executor never registered (a dependency the analyzer did
    /// not see statically) is registered pending here and reported as
    /// `Start`, so demand-driven execution covers it. The export value for
    /// a completed dependency is fetched through its wrapper while the
    /// state lock is held; the wrapper lock is always acquired after the
    /// state lock, never the other way around.
    pub fn request(
        &self,
        task: &str,
        export: &str,
        wrapper: Arc<TaskWrapper>,
        resume: oneshot::Sender<WaiterResume>,
    ) -> RequestOutcome {
        let mut records = self.records.lock().unwrap();
        let record = records.entry(task.to_string()).or_insert_with(|| Record {
            state: RecordState::Pending,
            wrapper,
            error: None,
            waiters: Vec::new(),
        });

        match record.state {
            RecordState::Completed => match record.wrapper.export(export) {
                Ok(value) => RequestOutcome::Completed(value),
                Err(ExportFetch::Missing) => RequestOutcome::Error(Arc::new(anyhow::anyhow!(
                    "task '{task}' has no export named '{export}'"
                ))),
                Err(_) => RequestOutcome::Error(Arc::new(anyhow::anyhow!(
                    "export '{export}' of task '{task}' is not readable"
                ))),
            },
            RecordState::Error => {
                let cause = record
                    .error
                    .clone()
                    .unwrap_or_else(|| Arc::new(anyhow::anyhow!("task '{task}' failed")));
                RequestOutcome::Error(cause)
            }
            RecordState::Running => {
                record.waiters.push(Waiter {
                    export: export.to_string(),
                    resume,
                });
                debug!(%task, %export, "dependency running; parked");
                RequestOutcome::Wait
            }
            RecordState::Pending => {
                record.waiters.push(Waiter {
                    export: export.to_string(),
                    resume,
                });
                debug!(%task, %export, "dependency pending; caller will start it");
                RequestOutcome::Start
            }
        }
    }

    pub fn is_registered(&self, task: &str) -> bool {
        self.records.lock().unwrap().contains_key(task)
    }
}

/// Resume every waiter of a completed task with its requested export.
///
/// Called after `mark_completed`, outside the state lock. A dropped
/// receiver (a requester that went away) is ignored.
pub fn notify_completed(wrapper: &TaskWrapper, waiters: Vec<Waiter>) {
    for waiter in waiters {
        let resume = match wrapper.export(&waiter.export) {
            Ok(value) => WaiterResume::Value(value),
            Err(ExportFetch::Missing) => WaiterResume::Error(Arc::new(anyhow::anyhow!(
                "task '{}' has no export named '{}'",
                wrapper.id(),
                waiter.export
            ))),
            Err(_) => WaiterResume::Error(Arc::new(anyhow::anyhow!(
                "export '{}' of task '{}' is not readable",
                waiter.export,
                wrapper.id()
            ))),
        };
        let _ = waiter.resume.send(resume);
    }
}

/// Resume every waiter of a failed or skipped task with the shared cause.
pub fn notify_failed(waiters: Vec<Waiter>, cause: &SharedCause) {
    for waiter in waiters {
        let _ = waiter.resume.send(WaiterResume::Error(cause.clone()));
    }
}
