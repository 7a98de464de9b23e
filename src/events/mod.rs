// src/events/mod.rs

//! Lifecycle event facade.
//!
//! A small publish-subscribe hub: observers register once and receive the
//! fixed event alphabet (lifecycle, phase, task transition, group markers).
//! Observer failures are isolated: a panic inside an observer is logged and
//! swallowed, never propagated into the dispatch loop. The observer list is
//! mutated under a mutex; dispatch snapshots the list and runs unlocked.

pub mod log_observer;

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use tracing::warn;

use crate::dag::DepGraph;
use crate::errors::SharedCause;
use crate::task::{TaskId, TaskState};

pub use log_observer::LogObserver;

/// Execution phase: forward (`run`) or reverse (`clean`) dependency order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Run,
    Clean,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Run => f.write_str("run"),
            Phase::Clean => f.write_str("clean"),
        }
    }
}

/// One task state transition, delivered in real order per task.
#[derive(Debug, Clone)]
pub struct TaskTransition {
    pub task: TaskId,
    pub prev: TaskState,
    pub next: TaskState,
    pub phase: Phase,
    pub timestamp: SystemTime,
    pub error: Option<SharedCause>,
}

/// Collaborator that routes a task's textual output; the engine only asks
/// it for a failing task's recent lines.
pub trait OutputCapture: Send + Sync {
    fn recent_lines(&self, task: &TaskId) -> Vec<String>;
}

/// Lifecycle observer. Every method has a no-op default, so implementors
/// pick the events they care about.
#[allow(unused_variables)]
pub trait Observer: Send + Sync {
    /// The dependency graph is built; observers may pull structure now.
    fn on_ready(&self, graph: &DepGraph) {}

    fn on_start(&self) {}

    fn on_stop(&self) {}

    fn on_phase_started(&self, phase: Phase) {}

    fn on_phase_completed(&self, phase: Phase) {}

    fn on_task_updated(&self, transition: &TaskTransition) {}

    fn on_group_started(&self, task: &TaskId, name: &str, phase: Phase, timestamp: SystemTime) {}

    fn on_group_completed(&self, task: &TaskId, name: &str, phase: Phase, timestamp: SystemTime) {}

    fn set_root_task(&self, root: &TaskId) {}

    fn set_output_capture(&self, capture: &Arc<dyn OutputCapture>) {}
}

/// Observer registry and dispatcher.
#[derive(Default)]
pub struct EventHub {
    observers: Mutex<Vec<Arc<dyn Observer>>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&self, observer: Arc<dyn Observer>) {
        self.observers.lock().unwrap().push(observer);
    }

    pub fn observer_count(&self) -> usize {
        self.observers.lock().unwrap().len()
    }

    fn dispatch(&self, event: &str, f: impl Fn(&dyn Observer)) {
        let snapshot: Vec<Arc<dyn Observer>> = self.observers.lock().unwrap().clone();
        for observer in snapshot {
            if catch_unwind(AssertUnwindSafe(|| f(observer.as_ref()))).is_err() {
                warn!(event, "observer panicked; ignoring");
            }
        }
    }

    pub fn ready(&self, graph: &DepGraph) {
        self.dispatch("ready", |o| o.on_ready(graph));
    }

    pub fn start(&self) {
        self.dispatch("start", |o| o.on_start());
    }

    pub fn stop(&self) {
        self.dispatch("stop", |o| o.on_stop());
    }

    pub fn phase_started(&self, phase: Phase) {
        self.dispatch("phase_started", |o| o.on_phase_started(phase));
    }

    pub fn phase_completed(&self, phase: Phase) {
        self.dispatch("phase_completed", |o| o.on_phase_completed(phase));
    }

    pub fn task_updated(
        &self,
        task: &TaskId,
        prev: TaskState,
        next: TaskState,
        phase: Phase,
        error: Option<SharedCause>,
    ) {
        let transition = TaskTransition {
            task: task.clone(),
            prev,
            next,
            phase,
            timestamp: SystemTime::now(),
            error,
        };
        self.dispatch("task_updated", |o| o.on_task_updated(&transition));
    }

    pub fn group_started(&self, task: &TaskId, name: &str, phase: Phase) {
        let now = SystemTime::now();
        self.dispatch("group_started", |o| o.on_group_started(task, name, phase, now));
    }

    pub fn group_completed(&self, task: &TaskId, name: &str, phase: Phase) {
        let now = SystemTime::now();
        self.dispatch("group_completed", |o| {
            o.on_group_completed(task, name, phase, now)
        });
    }

    pub fn set_root_task(&self, root: &TaskId) {
        self.dispatch("set_root_task", |o| o.set_root_task(root));
    }

    pub fn set_output_capture(&self, capture: &Arc<dyn OutputCapture>) {
        self.dispatch("set_output_capture", |o| o.set_output_capture(capture));
    }
}
